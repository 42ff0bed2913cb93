use std::{
    fmt,
    io::{self, Read, Write},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

#[cfg(windows)]
use crate::platform::NamedPipeConnection;
#[cfg(unix)]
use crate::{cleanup::Cleanup, endpoint::Endpoint, error::PipeError};
use crate::error::Result;

/// Filesystem identity of both directions of a channel, as seen from the
/// channel that reports them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamNames {
    /// Path data is read from
    pub inbound:  PathBuf,
    /// Path data is written to
    pub outbound: PathBuf,
}

impl StreamNames {
    pub fn new<I: Into<PathBuf>, O: Into<PathBuf>>(inbound: I, outbound: O) -> Self {
        Self {
            inbound:  inbound.into(),
            outbound: outbound.into(),
        }
    }

    /// Both directions share one bidirectional pipe.
    pub fn single<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self {
            inbound:  path.clone(),
            outbound: path,
        }
    }

    /// The same pipes seen from the other process: its inbound is our
    /// outbound.
    pub fn reversed(&self) -> Self {
        Self {
            inbound:  self.outbound.clone(),
            outbound: self.inbound.clone(),
        }
    }
}

impl fmt::Display for StreamNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in: {} out: {}",
            self.inbound.display(),
            self.outbound.display()
        )
    }
}

/// Pipes backing a channel
#[derive(Debug)]
enum Link {
    #[cfg(unix)]
    /// Two one-directional FIFOs
    Fifo { inbound: Endpoint, outbound: Endpoint },
    #[cfg(windows)]
    /// One bidirectional named pipe connection
    NamedPipe(NamedPipeConnection),
}

/// A read + write + close handle over named pipes.
///
/// Reads and writes open the underlying pipe on first use and may block
/// until the peer process shows up. One thread may read while another
/// writes; concurrent reads (or concurrent writes) must be serialized by the
/// caller. A closed channel can't be reopened.
#[derive(Debug)]
pub struct DuplexChannel {
    names: StreamNames,
    link:  Link,
}

impl DuplexChannel {
    #[cfg(unix)]
    pub(crate) fn from_fifos(inbound: Endpoint, outbound: Endpoint) -> Self {
        Self {
            names: StreamNames::new(inbound.path(), outbound.path()),
            link:  Link::Fifo { inbound, outbound },
        }
    }

    #[cfg(windows)]
    pub(crate) fn from_named_pipe(connection: NamedPipeConnection) -> Self {
        Self {
            names: StreamNames::single(connection.path()),
            link:  Link::NamedPipe(connection),
        }
    }

    /// Paths of both directions; hand these to the peer process.
    pub fn names(&self) -> &StreamNames {
        &self.names
    }

    /// Reads from the inbound direction.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match &self.link {
            #[cfg(unix)]
            Link::Fifo { inbound, .. } => inbound.read(buf),
            #[cfg(windows)]
            Link::NamedPipe(connection) => connection.read(buf),
        }
    }

    /// Writes to the outbound direction.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        match &self.link {
            #[cfg(unix)]
            Link::Fifo { outbound, .. } => outbound.write(buf),
            #[cfg(windows)]
            Link::NamedPipe(connection) => connection.write(buf),
        }
    }

    pub fn flush(&self) -> Result<()> {
        match &self.link {
            #[cfg(unix)]
            Link::Fifo { outbound, .. } => outbound.flush(),
            #[cfg(windows)]
            Link::NamedPipe(connection) => connection.flush(),
        }
    }

    /// Tears the channel down: outbound first, then inbound. Every step is
    /// attempted and the last failure is returned. Closing twice reports
    /// `AlreadyClosed`.
    pub fn close(&self) -> Result<()> {
        tracing::debug!(names = %self.names, "closing duplex channel");
        match &self.link {
            #[cfg(unix)]
            Link::Fifo { inbound, outbound } => {
                if inbound.is_closed() && outbound.is_closed() {
                    return Err(PipeError::AlreadyClosed {
                        path: self.names.outbound.clone(),
                    });
                }
                let mut cleanup = Cleanup::new();
                cleanup
                    .step("close outbound", || outbound.close())
                    .step("close inbound", || inbound.close());
                cleanup.finish()
            }
            #[cfg(windows)]
            Link::NamedPipe(connection) => connection.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.link {
            #[cfg(unix)]
            Link::Fifo { inbound, outbound } => inbound.is_closed() && outbound.is_closed(),
            #[cfg(windows)]
            Link::NamedPipe(connection) => connection.is_closed(),
        }
    }
}

impl Read for &DuplexChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(DuplexChannel::read(*self, buf)?)
    }
}

impl Write for &DuplexChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(DuplexChannel::write(*self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(DuplexChannel::flush(*self)?)
    }
}

impl Read for DuplexChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(DuplexChannel::read(self, buf)?)
    }
}

impl Write for DuplexChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(DuplexChannel::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(DuplexChannel::flush(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_names_swap_directions() {
        let names = StreamNames::new("/tmp/1.in.pipe", "/tmp/1.out.pipe");
        let peer = names.reversed();
        assert_eq!(peer.inbound, PathBuf::from("/tmp/1.out.pipe"));
        assert_eq!(peer.outbound, PathBuf::from("/tmp/1.in.pipe"));
        assert_eq!(peer.reversed(), names);
    }

    #[test]
    fn names_display_both_paths() {
        let names = StreamNames::single("/tmp/5.pipe");
        assert_eq!(names.to_string(), "in: /tmp/5.pipe out: /tmp/5.pipe");
    }

    #[test]
    fn names_survive_json() {
        let names = StreamNames::new("/tmp/2.in.pipe", "/tmp/2.out.pipe");
        let json = serde_json::to_string(&names).unwrap();
        assert_eq!(serde_json::from_str::<StreamNames>(&json).unwrap(), names);
    }

    #[cfg(unix)]
    #[test]
    fn close_removes_both_fifos_and_is_single_use() {
        use crate::endpoint::AccessMode;

        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("7.in.pipe");
        let out_path = dir.path().join("7.out.pipe");
        let channel = DuplexChannel::from_fifos(
            Endpoint::create(&in_path, AccessMode::Read).unwrap(),
            Endpoint::create(&out_path, AccessMode::Write).unwrap(),
        );

        assert_eq!(channel.names(), &StreamNames::new(&in_path, &out_path));
        assert!(channel.close().is_ok());
        assert!(channel.is_closed());
        assert!(!in_path.exists());
        assert!(!out_path.exists());

        let mut buf = [0u8; 8];
        assert!(channel.read(&mut buf).unwrap_err().is_closed());
        assert!(channel.write(b"late").unwrap_err().is_closed());

        let again = channel.close().unwrap_err();
        assert!(again.is_closed());
        assert_eq!(again.path(), Some(&out_path));
    }

    #[cfg(unix)]
    fn fifo_channel(dir: &tempfile::TempDir) -> DuplexChannel {
        use crate::endpoint::AccessMode;

        DuplexChannel::from_fifos(
            Endpoint::create(dir.path().join("8.in.pipe"), AccessMode::Read).unwrap(),
            Endpoint::create(dir.path().join("8.out.pipe"), AccessMode::Write).unwrap(),
        )
    }

    #[cfg(unix)]
    #[test]
    fn failed_outbound_cleanup_still_closes_inbound() {
        let dir = tempfile::tempdir().unwrap();
        let channel = fifo_channel(&dir);
        let names = channel.names().clone();
        std::fs::remove_file(&names.outbound).unwrap();

        let err = channel.close().unwrap_err();
        assert!(matches!(err, PipeError::CleanupFailed { ref path, .. } if *path == names.outbound));
        assert!(!names.inbound.exists());
        assert!(channel.is_closed());
        match &channel.link {
            Link::Fifo { inbound, outbound } => {
                assert!(inbound.is_closed());
                assert!(outbound.is_closed());
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn inbound_failure_wins_when_both_steps_fail() {
        let dir = tempfile::tempdir().unwrap();
        let channel = fifo_channel(&dir);
        let names = channel.names().clone();
        std::fs::remove_file(&names.outbound).unwrap();
        std::fs::remove_file(&names.inbound).unwrap();

        let err = channel.close().unwrap_err();
        assert!(matches!(err, PipeError::CleanupFailed { ref path, .. } if *path == names.inbound));
        assert!(channel.is_closed());
    }
}
