use std::process::ExitCode;

use clap::Parser;
use rxafs::protocol::afs::inverse_lookup2;
use rxafs::xdr::afsint::{AFSFid, RXAFS_PORT, RXAFS_SERVICE_ID};
use rxafs::{destroy_connection, new_connection, rx_init, RxConfig};

/// Resolves a file identifier to its name and parent directory by calling
/// InverseLookup2 on a file server.
#[derive(Parser)]
#[command(name = "get_name")]
struct Args {
    /// File identifier as "volume.vnode.unique"
    fid: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = RXAFS_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let fid = match args.fid.parse::<AFSFid>() {
        Ok(fid) => fid,
        Err(e) => {
            eprintln!("Error in parsing arg {:?}: {}", args.fid, e);
            eprintln!("Format: \"volume.vnode.unique\"");
            return ExitCode::FAILURE;
        }
    };

    match run(&args.host, args.port, fid).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Received:\t{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(host: &str, port: u16, fid: AFSFid) -> anyhow::Result<()> {
    let rx = rx_init(0u32, 0, RxConfig::default()).await?;
    let mut conn = new_connection(&rx, host, port, RXAFS_SERVICE_ID)?;

    println!("Sent:\t{fid}");
    let result = inverse_lookup2(&mut conn, fid).await;
    destroy_connection(conn);

    let (name, parent) = result?;
    println!("Received:\tFilename: {name:?}, Parent: {parent}");
    Ok(())
}
