//! Platform-specific pipe strategies.
//!
//! - Unix: two FIFOs, one per direction
//! - Windows: one bidirectional named pipe

use std::path::PathBuf;

use crate::{
    duplex::{DuplexChannel, StreamNames},
    error::Result,
};

#[cfg(unix)]
mod fifo;
#[cfg(windows)]
mod named_pipe;

#[cfg(unix)]
pub use fifo::FifoStrategy;
#[cfg(windows)]
pub use named_pipe::{NamedPipeConnection, NamedPipeStrategy};

/// Strategy used by [`crate::PipeFactory`] on this platform
#[cfg(unix)]
pub type DefaultStrategy = FifoStrategy;
/// Strategy used by [`crate::PipeFactory`] on this platform
#[cfg(windows)]
pub type DefaultStrategy = NamedPipeStrategy;

/// Knows which pipe objects a duplex channel needs and how to build them.
pub trait PipeStrategy: Send + Sync {
    /// Name patterns to reserve, one per pipe object.
    fn patterns(&self) -> &'static [&'static str];

    /// Builds the owning side of a channel on freshly reserved paths. If a
    /// later pipe object can't be created, the earlier ones are removed
    /// before the error is returned.
    fn materialize(&self, paths: &[PathBuf]) -> Result<DuplexChannel>;

    /// Builds the peer side of a channel announced by its owner. `names` are
    /// the owner's names; the returned channel reports them reversed.
    fn attach(&self, names: &StreamNames) -> Result<DuplexChannel>;
}
