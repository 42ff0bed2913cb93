use std::{io::BufReader, path::PathBuf, process, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use duplexpipe::{PipeConfig, PipeFactory};
use duplexpipe_echo::echo_values;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "pipe-echo")]
#[command(about = "Create a duplex pipe and echo JSON values sent through it")]
struct Args {
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Directory for the pipe files (defaults to DUPLEXPIPE_TMPDIR or the system temp dir)
    #[arg(short, long)]
    temp_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = PipeConfig::from_env();
    if let Some(dir) = args.temp_dir {
        config = config.with_temp_dir(dir);
    }

    let factory = PipeFactory::new(config);
    let channel = Arc::new(factory.make_duplex().context("Failed to create duplex pipe")?);

    // The peer writes into our inbound stream and reads our outbound one.
    println!("In: {}", channel.names().inbound.display());
    println!("Out: {}", channel.names().outbound.display());
    println!();

    {
        let channel = Arc::clone(&channel);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal, closing pipe...");
            if let Err(e) = channel.close() {
                error!("Failed to close pipe: {}", e);
            }
            process::exit(130);
        })
        .context("Failed to set signal handler")?;
    }

    let echoed = echo_values(BufReader::new(&*channel), &*channel)?;
    info!(echoed, "peer disconnected");

    channel.close().context("Failed to close duplex pipe")?;
    Ok(())
}
