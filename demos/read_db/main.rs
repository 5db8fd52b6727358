use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rxafs::ridb::decode_dump;

/// Lists a fileserver's reverse-index database.
///
/// Reads the output of `mdb_dump -p <LMDB_DIR>` (or plain `mdb_dump`) from a
/// file, or from stdin when no file is given.
#[derive(Parser)]
#[command(name = "read_db")]
struct Args {
    dump: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let text = match &args.dump {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("reading stdin")?;
            text
        }
    };

    let db = decode_dump(&text)?;
    println!("(VNODE, VUNIQUE, FILE_NAME): FILE_NAME\n");
    for (key, name) in &db {
        println!("{key}: {name:?}");
    }
    Ok(())
}
