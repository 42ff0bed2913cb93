//! Error types for pipe creation, I/O and teardown.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Main error type for all duplexpipe operations.
#[derive(Debug, Error)]
pub enum PipeError {
    /// No candidate name set was free within the attempt budget.
    #[error("ran out of attempts ({attempts}) to find unused pipe names")]
    NameExhausted {
        /// Number of candidate sets that were drawn and rejected
        attempts: u32,
    },

    /// The directory pipes are created in cannot be accessed.
    #[error("temp directory {path:?} is not usable: {source}")]
    TempDirUnavailable {
        /// Directory that was probed
        path:   PathBuf,
        /// Error reported by the probe
        #[source]
        source: io::Error,
    },

    /// The OS refused to create the pipe object.
    #[error("failed to create pipe {path:?}: {source}")]
    PipeCreateFailed {
        /// Path of the pipe object
        path:   PathBuf,
        /// Error reported by the OS
        #[source]
        source: io::Error,
    },

    /// Opening, dialing, listening on or accepting the pipe failed.
    #[error("failed to open pipe {path:?}: {source}")]
    OpenFailed {
        /// Path of the pipe object
        path:   PathBuf,
        /// Error reported by the OS
        #[source]
        source: io::Error,
    },

    /// The pipe has already been torn down.
    #[error("pipe {path:?} has already been closed")]
    AlreadyClosed {
        /// Path of the pipe object
        path: PathBuf,
    },

    /// The pipe was explicitly opened a second time.
    #[error("pipe {path:?} is already open and can't be reopened")]
    AlreadyOpened {
        /// Path of the pipe object
        path: PathBuf,
    },

    /// A read, write, flush or handle release on an open pipe failed.
    #[error("I/O error on pipe {path:?}: {source}")]
    IoFailed {
        /// Path of the pipe object
        path:   PathBuf,
        /// Error reported by the OS
        #[source]
        source: io::Error,
    },

    /// Removing the pipe object from the filesystem failed.
    #[error("failed to remove pipe {path:?}: {source}")]
    CleanupFailed {
        /// Path of the pipe object
        path:   PathBuf,
        /// Error reported by the OS
        #[source]
        source: io::Error,
    },

    /// A strategy was handed the wrong number of reserved names.
    #[error("expected {expected} pipe names, got {got}")]
    NameCount {
        /// Names the strategy needs
        expected: usize,
        /// Names it was given
        got:      usize,
    },
}

impl PipeError {
    /// Path of the pipe object involved, if the error is tied to one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::TempDirUnavailable { path, .. }
            | Self::PipeCreateFailed { path, .. }
            | Self::OpenFailed { path, .. }
            | Self::AlreadyClosed { path }
            | Self::AlreadyOpened { path }
            | Self::IoFailed { path, .. }
            | Self::CleanupFailed { path, .. } => Some(path),
            Self::NameExhausted { .. } | Self::NameCount { .. } => None,
        }
    }

    /// Whether this error reports use of a torn-down pipe.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed { .. })
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::NameExhausted { .. } => io::ErrorKind::AlreadyExists,
            Self::TempDirUnavailable { source, .. }
            | Self::PipeCreateFailed { source, .. }
            | Self::OpenFailed { source, .. }
            | Self::IoFailed { source, .. }
            | Self::CleanupFailed { source, .. } => source.kind(),
            Self::AlreadyClosed { .. } => io::ErrorKind::NotConnected,
            Self::AlreadyOpened { .. } => io::ErrorKind::Other,
            Self::NameCount { .. } => io::ErrorKind::InvalidInput,
        }
    }
}

/// Lets the `Read`/`Write` impls hand back pipe errors; the typed error is
/// reachable through `io::Error::get_ref`.
impl From<PipeError> for io::Error {
    fn from(err: PipeError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}

/// Result type alias using PipeError.
pub type Result<T> = std::result::Result<T, PipeError>;
