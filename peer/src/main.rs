use std::{
    io::{self, BufReader},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use duplexpipe::{PipeConfig, PipeFactory};
use duplexpipe_peer::{relay, stream_names};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "pipe-peer")]
#[command(about = "Join a duplex pipe and relay JSON lines from stdin")]
struct Args {
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// The `In:` path printed by the owning process
    #[arg(long = "in")]
    inbound: PathBuf,

    /// The `Out:` path printed by the owning process (required on Unix; on
    /// Windows it defaults to the `In:` path)
    #[arg(long = "out", required = cfg!(unix))]
    outbound: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    let names = stream_names(args.inbound, args.outbound)?;

    let factory = PipeFactory::new(PipeConfig::from_env());
    let channel = factory.connect(&names).context("Failed to join duplex pipe")?;

    let trips = relay(io::stdin().lock(), io::stdout().lock(), BufReader::new(&channel), &channel)?;
    info!(trips, "input exhausted");

    channel.close().context("Failed to close duplex pipe")?;
    Ok(())
}
