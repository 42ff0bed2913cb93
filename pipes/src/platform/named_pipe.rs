use std::{
    ffi::OsStr,
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    iter,
    os::windows::{
        ffi::OsStrExt,
        io::{AsRawHandle, FromRawHandle},
    },
    path::{Path, PathBuf},
    ptr,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use windows_sys::Win32::{
    Foundation::{ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{FILE_FLAG_FIRST_PIPE_INSTANCE, PIPE_ACCESS_DUPLEX},
    System::Pipes::{
        ConnectNamedPipe, CreateNamedPipeW, WaitNamedPipeW, PIPE_READMODE_BYTE,
        PIPE_REJECT_REMOTE_CLIENTS, PIPE_TYPE_BYTE, PIPE_WAIT,
    },
};

use super::PipeStrategy;
use crate::{
    config::{PipeConfig, PIPE_PATTERN},
    duplex::{DuplexChannel, StreamNames},
    error::{PipeError, Result},
    handle::{release, LazyHandle, PipeState},
};

const PATTERNS: &[&str] = &[PIPE_PATTERN];

const BUFFER_SIZE: u32 = 4096;
const DIAL_POLL: Duration = Duration::from_millis(10);

fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(iter::once(0)).collect()
}

/// Creates a single-instance byte-mode pipe server on `path` and waits for
/// one client to connect.
fn listen(path: &Path) -> io::Result<File> {
    let name = wide(path.as_os_str());

    // SAFETY: CreateNamedPipeW is safe with a NUL-terminated UTF-16 name that
    // outlives the call and null security attributes (default DACL).
    let handle = unsafe {
        CreateNamedPipeW(
            name.as_ptr(),
            PIPE_ACCESS_DUPLEX | FILE_FLAG_FIRST_PIPE_INSTANCE,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
            1, // Max instances
            BUFFER_SIZE,
            BUFFER_SIZE,
            0, // Default timeout for WaitNamedPipe
            ptr::null(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: the handle was just created, is valid, and is owned by nothing
    // else; the File closes it on every path below.
    let pipe = unsafe { File::from_raw_handle(handle) };

    tracing::debug!(?path, "waiting for named pipe client");
    // SAFETY: ConnectNamedPipe is safe with a valid pipe handle and a null
    // overlapped pointer (synchronous connect).
    let connected = unsafe { ConnectNamedPipe(pipe.as_raw_handle(), ptr::null_mut()) };
    if connected == 0 {
        let err = io::Error::last_os_error();
        // The client won the race between create and connect; still connected.
        if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
            return Err(err);
        }
    }
    Ok(pipe)
}

/// Opens the client end of the pipe at `path`, waiting up to `timeout` for a
/// server to create it.
fn dial(path: &Path, timeout: Duration) -> io::Result<File> {
    let deadline = Instant::now() + timeout;
    loop {
        let err = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(pipe) => return Ok(pipe),
            Err(err) => err,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(err);
        }
        let remaining = deadline - now;

        if err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) {
            let name = wide(path.as_os_str());
            let millis = u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX);
            // SAFETY: WaitNamedPipeW is safe with a NUL-terminated UTF-16 name
            // that outlives the call.
            unsafe { WaitNamedPipeW(name.as_ptr(), millis) };
        } else if err.kind() == io::ErrorKind::NotFound {
            // The server hasn't created the pipe yet.
            thread::sleep(DIAL_POLL.min(remaining));
        } else {
            return Err(err);
        }
    }
}

/// One bidirectional named pipe connection, created on first use.
///
/// The first read listens on the name and accepts a single client; the first
/// write dials an existing server instead. Whichever happens first decides
/// the role, and afterwards both directions share the connection.
#[derive(Debug)]
pub struct NamedPipeConnection {
    handle:       LazyHandle,
    dial_timeout: Duration,
}

impl NamedPipeConnection {
    pub fn new<P: Into<PathBuf>>(path: P, dial_timeout: Duration) -> Self {
        Self {
            handle: LazyHandle::new(path.into()),
            dial_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn state(&self) -> PipeState {
        self.handle.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == PipeState::Closed
    }

    fn io_failed(&self, source: io::Error) -> PipeError {
        PipeError::IoFailed {
            path: self.path().to_path_buf(),
            source,
        }
    }

    fn connection_for_read(&self) -> Result<Arc<File>> {
        self.handle.get_or_open(listen)
    }

    fn connection_for_write(&self) -> Result<Arc<File>> {
        let timeout = self.dial_timeout;
        self.handle.get_or_open(|path| dial(path, timeout))
    }

    /// Reads from the connection, listening for a client first if nothing is
    /// connected yet.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let pipe = self.connection_for_read()?;
        (&*pipe).read(buf).map_err(|e| self.io_failed(e))
    }

    /// Writes to the connection, dialing the server first if nothing is
    /// connected yet.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let pipe = self.connection_for_write()?;
        (&*pipe).write(buf).map_err(|e| self.io_failed(e))
    }

    pub fn flush(&self) -> Result<()> {
        match self.state() {
            PipeState::Unopened => Ok(()),
            PipeState::Closed => Err(self.handle.closed_error()),
            PipeState::Open => {
                let pipe = self.connection_for_write()?;
                (&*pipe).flush().map_err(|e| self.io_failed(e))
            }
        }
    }

    /// Releases the connection. The pipe's namespace entry disappears with
    /// the last handle to it, so this happens at most once.
    pub fn close(&self) -> Result<()> {
        let pipe = self.handle.shut()?;
        tracing::debug!(path = ?self.path(), "closing named pipe");
        match pipe {
            Some(pipe) => release(self.path(), pipe),
            None => Ok(()),
        }
    }
}

impl Drop for NamedPipeConnection {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(path = ?self.path(), error = %e, "failed to release named pipe on drop");
        }
    }
}

/// Duplex channels over one `\\.\pipe\<token>.pipe` named pipe.
#[derive(Debug, Clone, Copy)]
pub struct NamedPipeStrategy {
    dial_timeout: Duration,
}

impl NamedPipeStrategy {
    pub fn from_config(config: &PipeConfig) -> Self {
        Self {
            dial_timeout: config.dial_timeout,
        }
    }
}

impl Default for NamedPipeStrategy {
    fn default() -> Self {
        Self::from_config(&PipeConfig::default())
    }
}

impl PipeStrategy for NamedPipeStrategy {
    fn patterns(&self) -> &'static [&'static str] {
        PATTERNS
    }

    fn materialize(&self, paths: &[PathBuf]) -> Result<DuplexChannel> {
        let [path] = paths else {
            return Err(PipeError::NameCount {
                expected: PATTERNS.len(),
                got:      paths.len(),
            });
        };
        Ok(DuplexChannel::from_named_pipe(NamedPipeConnection::new(
            path.clone(),
            self.dial_timeout,
        )))
    }

    fn attach(&self, names: &StreamNames) -> Result<DuplexChannel> {
        Ok(DuplexChannel::from_named_pipe(NamedPipeConnection::new(
            names.inbound.clone(),
            self.dial_timeout,
        )))
    }
}
