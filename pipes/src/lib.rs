//! Duplex Pipe Library
//!
//! This crate turns operating-system named pipes into a single duplex byte
//! stream that two independent processes can share. It includes:
//!
//! - Collision-resistant temporary pipe names
//! - Lazily opened pipe endpoints with an explicit open/close lifecycle
//! - Platform strategies (two FIFOs on Unix, one named pipe on Windows)
//! - A duplex channel with best-effort, last-error-wins teardown
//!
//! # Example
//!
//! ```no_run
//! use std::io::{BufRead, BufReader, Write};
//!
//! use duplexpipe::{PipeConfig, PipeFactory};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = PipeFactory::new(PipeConfig::from_env());
//! let channel = factory.make_duplex()?;
//!
//! // The peer process needs these paths to join.
//! println!("In: {}", channel.names().inbound.display());
//! println!("Out: {}", channel.names().outbound.display());
//!
//! let mut line = String::new();
//! BufReader::new(&channel).read_line(&mut line)?;
//! (&channel).write_all(line.as_bytes())?;
//!
//! channel.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Reads and writes block until the peer opens its side; wrap calls yourself
//! if you need timeouts.

mod cleanup;
/// Pipe configuration and naming constants
pub mod config;
mod duplex;
#[cfg(unix)]
mod endpoint;
mod error;
mod factory;
mod handle;
mod name;
/// Platform-specific pipe strategies
pub mod platform;

pub use cleanup::Cleanup;
pub use config::PipeConfig;
pub use duplex::{DuplexChannel, StreamNames};
#[cfg(unix)]
pub use endpoint::{AccessMode, Endpoint};
pub use error::{PipeError, Result};
pub use factory::PipeFactory;
pub use handle::PipeState;
pub use name::{NameGenerator, Pattern};
pub use platform::{DefaultStrategy, PipeStrategy};
