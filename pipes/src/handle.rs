//! Open-once state machine shared by FIFO endpoints and Windows connections.

use std::{
    fs::File,
    io,
    mem,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError},
};

use crate::error::{PipeError, Result};

/// Observable lifecycle of a pipe handle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    /// The pipe object exists but nothing has opened it yet
    Unopened,
    /// The OS handle is open
    Open,
    /// Torn down; can never be opened again
    Closed,
}

#[derive(Debug)]
enum Slot {
    Unopened,
    Open(Arc<File>),
    Closed,
}

/// A path plus a lazily opened OS handle.
///
/// The slot lock is only held for state changes, never across a blocking
/// open, so `close` can always make progress. Opens are serialized by a
/// second lock so concurrent first use still performs a single OS open.
#[derive(Debug)]
pub(crate) struct LazyHandle {
    path:    PathBuf,
    slot:    Mutex<Slot>,
    opening: Mutex<()>,
}

impl LazyHandle {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            slot: Mutex::new(Slot::Unopened),
            opening: Mutex::new(()),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Every transition is a single assignment, so a poisoned slot is still consistent.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> PipeState {
        match *self.lock() {
            Slot::Unopened => PipeState::Unopened,
            Slot::Open(_) => PipeState::Open,
            Slot::Closed => PipeState::Closed,
        }
    }

    pub(crate) fn closed_error(&self) -> PipeError {
        PipeError::AlreadyClosed {
            path: self.path.clone(),
        }
    }

    fn current(&self) -> Result<Option<Arc<File>>> {
        match &*self.lock() {
            Slot::Unopened => Ok(None),
            Slot::Open(file) => Ok(Some(Arc::clone(file))),
            Slot::Closed => Err(self.closed_error()),
        }
    }

    /// Returns the open handle, running `open` first if this is the first use.
    pub(crate) fn get_or_open<F>(&self, open: F) -> Result<Arc<File>>
    where
        F: FnOnce(&Path) -> io::Result<File>,
    {
        if let Some(file) = self.current()? {
            return Ok(file);
        }

        let _opening = self.opening.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished opening while we waited.
        if let Some(file) = self.current()? {
            return Ok(file);
        }

        tracing::debug!(path = ?self.path, "opening pipe");
        let file = open(&self.path).map_err(|source| PipeError::OpenFailed {
            path: self.path.clone(),
            source,
        })?;
        let file = Arc::new(file);

        let mut slot = self.lock();
        if matches!(*slot, Slot::Closed) {
            tracing::debug!(path = ?self.path, "pipe closed while its open was pending");
            return Err(self.closed_error());
        }
        *slot = Slot::Open(Arc::clone(&file));
        Ok(file)
    }

    /// Opens the handle, failing if it was opened before.
    pub(crate) fn open_once<F>(&self, open: F) -> Result<()>
    where
        F: FnOnce(&Path) -> io::Result<File>,
    {
        match self.state() {
            PipeState::Open => Err(PipeError::AlreadyOpened {
                path: self.path.clone(),
            }),
            PipeState::Closed => Err(self.closed_error()),
            PipeState::Unopened => self.get_or_open(open).map(drop),
        }
    }

    /// Whether another thread is inside `get_or_open` right now, possibly
    /// blocked in the OS open.
    pub(crate) fn open_pending(&self) -> bool {
        matches!(self.opening.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Waits for an in-progress open to finish.
    pub(crate) fn wait_for_pending_open(&self) {
        drop(self.opening.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Moves to `Closed` and hands back the open handle, if any. Fails when
    /// the handle was already closed.
    pub(crate) fn shut(&self) -> Result<Option<Arc<File>>> {
        match mem::replace(&mut *self.lock(), Slot::Closed) {
            Slot::Unopened => Ok(None),
            Slot::Open(file) => Ok(Some(file)),
            Slot::Closed => Err(self.closed_error()),
        }
    }
}

/// Closes the handle taken out of a [`LazyHandle`]. While another thread is
/// still inside a read or write on it, the OS handle stays alive until that
/// call returns.
pub(crate) fn release(path: &Path, file: Arc<File>) -> Result<()> {
    match Arc::try_unwrap(file) {
        Ok(file) => close_file(path, file),
        Err(shared) => {
            tracing::debug!(?path, "handle still in use, deferring close");
            drop(shared);
            Ok(())
        }
    }
}

#[cfg(unix)]
fn close_file(path: &Path, file: File) -> Result<()> {
    use std::os::fd::IntoRawFd;

    nix::unistd::close(file.into_raw_fd()).map_err(|errno| PipeError::IoFailed {
        path:   path.to_path_buf(),
        source: errno.into(),
    })
}

#[cfg(not(unix))]
fn close_file(_path: &Path, file: File) -> Result<()> {
    drop(file);
    Ok(())
}
