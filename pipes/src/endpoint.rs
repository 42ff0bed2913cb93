//! One direction of a Unix FIFO.
//!
//! An [`Endpoint`] is created together with its FIFO but only opens it on the
//! first read or write. Opening a FIFO blocks until the other side opens it
//! too, so deferring the open lets both processes learn the paths before
//! either of them commits to the rendezvous.

use std::{
    fmt, fs,
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    sync::Arc,
};

use nix::{fcntl::OFlag, sys::stat::Mode, unistd::mkfifo};

use crate::{
    cleanup::Cleanup,
    error::{PipeError, Result},
    handle::{release, LazyHandle, PipeState},
};

/// How an endpoint opens its FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only
    Read,
    /// Write-only, appending
    Write,
    /// Read and write through one descriptor, appending
    ReadWrite,
}

impl AccessMode {
    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => {
                options.read(true);
            }
            Self::Write => {
                options.append(true);
            }
            Self::ReadWrite => {
                options.read(true).append(true);
            }
        }
        options
    }

    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            Self::Read => "read-only",
            Self::Write => "write-only",
            Self::ReadWrite => "read-write",
        };
        f.write_str(mode)
    }
}

/// Whether closing the endpoint also deletes the FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    /// Created by this endpoint; removed on close
    Owned,
    /// Created by the peer process; left in place
    Attached,
}

/// A FIFO path with a lazily opened handle
#[derive(Debug)]
pub struct Endpoint {
    handle:  LazyHandle,
    mode:    AccessMode,
    backing: Backing,
}

impl Endpoint {
    /// Creates the FIFO at `path` with owner-only permissions. The FIFO is
    /// not opened until the first read or write.
    pub fn create<P: Into<PathBuf>>(path: P, mode: AccessMode) -> Result<Self> {
        let path = path.into();
        mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| {
            PipeError::PipeCreateFailed {
                path:   path.clone(),
                source: errno.into(),
            }
        })?;
        tracing::debug!(?path, %mode, "created fifo");

        Ok(Self {
            handle: LazyHandle::new(path),
            mode,
            backing: Backing::Owned,
        })
    }

    /// Wraps a FIFO another process created. Closing it releases the handle
    /// but leaves the FIFO for its owner to remove.
    pub fn attach<P: Into<PathBuf>>(path: P, mode: AccessMode) -> Self {
        Self {
            handle: LazyHandle::new(path.into()),
            mode,
            backing: Backing::Attached,
        }
    }

    /// Path of the FIFO
    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn state(&self) -> PipeState {
        self.handle.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == PipeState::Closed
    }

    fn file(&self) -> Result<Arc<File>> {
        let options = self.mode.open_options();
        self.handle.get_or_open(|path| options.open(path))
    }

    /// Opens the FIFO if this is the first use. Blocks until the peer opens
    /// the other end.
    pub fn try_open(&self) -> Result<()> {
        self.file().map(drop)
    }

    /// Opens the FIFO, failing with `AlreadyOpened` if it is already open.
    pub fn open(&self) -> Result<()> {
        let options = self.mode.open_options();
        self.handle.open_once(|path| options.open(path))
    }

    fn io_failed(&self, source: io::Error) -> PipeError {
        PipeError::IoFailed {
            path: self.path().to_path_buf(),
            source,
        }
    }

    /// Reads from the FIFO, opening it first if needed.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file()?;
        (&*file).read(buf).map_err(|e| self.io_failed(e))
    }

    /// Writes to the FIFO, opening it first if needed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let file = self.file()?;
        (&*file).write(buf).map_err(|e| self.io_failed(e))
    }

    /// Flushes the handle. A never-opened endpoint has nothing to flush.
    pub fn flush(&self) -> Result<()> {
        match self.state() {
            PipeState::Unopened => Ok(()),
            PipeState::Closed => Err(self.handle.closed_error()),
            PipeState::Open => {
                let file = self.file()?;
                (&*file).flush().map_err(|e| self.io_failed(e))
            }
        }
    }

    /// Completes the rendezvous another thread is blocked on, so its open
    /// returns and observes the close instead of waiting on an unlinked FIFO.
    fn unblock_pending_open(&self) {
        let path = self.path();
        let partner = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path);

        match partner {
            Ok(partner) => {
                tracing::debug!(?path, "waking pending open before close");
                self.handle.wait_for_pending_open();
                drop(partner);
            }
            // Nothing left to rendezvous with; the opener fails on its own.
            Err(e) => tracing::debug!(?path, error = %e, "could not wake pending open"),
        }
    }

    /// Releases the handle and, for owned endpoints, removes the FIFO. Both
    /// steps run even if the first fails; the last failure is returned. A
    /// second close fails with `AlreadyClosed`.
    pub fn close(&self) -> Result<()> {
        let file = self.handle.shut()?;
        let path = self.path();
        tracing::debug!(?path, "closing fifo");

        if file.is_none() && self.handle.open_pending() {
            self.unblock_pending_open();
        }

        let mut cleanup = Cleanup::new();
        cleanup.step("release handle", || match file {
            Some(file) => release(path, file),
            None => Ok(()),
        });
        if self.backing == Backing::Owned {
            cleanup.step("remove fifo", || {
                fs::remove_file(path).map_err(|source| PipeError::CleanupFailed {
                    path: path.to_path_buf(),
                    source,
                })
            });
        }
        cleanup.finish()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(path = ?self.path(), error = %e, "failed to clean up fifo on drop");
        }
    }
}

impl Read for &Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Endpoint::read(*self, buf)?)
    }
}

impl Write for &Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Endpoint::write(*self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Endpoint::flush(*self)?)
    }
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Endpoint::read(self, buf)?)
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Endpoint::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Endpoint::flush(self)?)
    }
}
