use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use engine::{Config, Engine};
use std::path::PathBuf;

/// Persistent embedded LSM key-value store.
#[derive(Parser)]
#[command(name = "silt", version, about)]
struct Args {
    /// Directory holding the store's files.
    #[arg(short, long, default_value = "data")]
    dir: PathBuf,

    /// Skip fsyncing the write-ahead log on every write.
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the value stored under KEY.
    Get { key: String },
    /// Store VALUE under KEY.
    Set { key: String, value: String },
    /// Delete KEY and print the value it held.
    Del { key: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    let mut config = Config::in_dir(&args.dir);
    config.sync_writes = !args.no_sync;
    let store = Engine::open(config)?;

    match args.command {
        Command::Get { key } => {
            require_nonempty("key", &key)?;
            match store.get(key.as_bytes()) {
                Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
                Err(engine::Error::NotFound) => bail!("key not found"),
                Err(e) => return Err(e.into()),
            }
        }
        Command::Set { key, value } => {
            require_nonempty("key", &key)?;
            require_nonempty("value", &value)?;
            store.set(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Command::Del { key } => {
            require_nonempty("key", &key)?;
            match store.del(key.as_bytes()) {
                Ok(prior) => println!("{}", String::from_utf8_lossy(&prior)),
                Err(engine::Error::NotFound) => bail!("key not found"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

fn require_nonempty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("{what} must not be empty");
    }
    Ok(())
}
