use std::path::PathBuf;

use super::PipeStrategy;
use crate::{
    config::{PipeConfig, IN_PIPE_PATTERN, OUT_PIPE_PATTERN},
    duplex::{DuplexChannel, StreamNames},
    endpoint::{AccessMode, Endpoint},
    error::{PipeError, Result},
};

const PATTERNS: &[&str] = &[IN_PIPE_PATTERN, OUT_PIPE_PATTERN];

/// Duplex channels made of two FIFOs: `<token>.in.pipe` is read, and
/// `<token>.out.pipe` is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoStrategy;

impl FifoStrategy {
    pub fn from_config(_config: &PipeConfig) -> Self {
        Self
    }
}

impl PipeStrategy for FifoStrategy {
    fn patterns(&self) -> &'static [&'static str] {
        PATTERNS
    }

    fn materialize(&self, paths: &[PathBuf]) -> Result<DuplexChannel> {
        let [in_path, out_path] = paths else {
            return Err(PipeError::NameCount {
                expected: PATTERNS.len(),
                got:      paths.len(),
            });
        };

        let inbound = Endpoint::create(in_path, AccessMode::Read)?;
        let outbound = match Endpoint::create(out_path, AccessMode::Write) {
            Ok(outbound) => outbound,
            Err(err) => {
                // Don't leave a half-built channel's FIFO behind.
                if let Err(cleanup_err) = inbound.close() {
                    tracing::warn!(
                        path = ?in_path,
                        error = %cleanup_err,
                        "failed to remove inbound fifo after outbound creation failed"
                    );
                }
                return Err(err);
            }
        };

        Ok(DuplexChannel::from_fifos(inbound, outbound))
    }

    fn attach(&self, names: &StreamNames) -> Result<DuplexChannel> {
        let peer = names.reversed();
        tracing::debug!(names = %peer, "attaching to announced fifos");
        Ok(DuplexChannel::from_fifos(
            Endpoint::attach(peer.inbound, AccessMode::Read),
            Endpoint::attach(peer.outbound, AccessMode::Write),
        ))
    }
}
