use clap::Parser;
use rxafs::volnamei::volumeid_to_path;

/// Prints where a volume's files live on a namei fileserver partition.
#[derive(Parser)]
#[command(name = "volnamei")]
struct Args {
    /// Partition name after "/vicep", e.g. "a"
    #[arg(default_value = "a")]
    partition: String,

    /// Numeric volume id
    #[arg(default_value_t = 536870927)]
    volume_id: u32,
}

fn main() {
    let args = Args::parse();
    println!("{}", volumeid_to_path(&args.partition, args.volume_id));
}
