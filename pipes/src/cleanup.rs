//! Best-effort teardown.
//!
//! Every step runs even when an earlier one failed. Failures are logged as
//! they happen and only the last one is reported to the caller.

use crate::error::{PipeError, Result};

/// Ordered set of teardown steps with last-error-wins reporting.
#[derive(Debug, Default)]
pub struct Cleanup {
    failures: usize,
    last:     Option<PipeError>,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `step`, recording its error if it fails.
    pub fn step<F>(&mut self, label: &str, step: F) -> &mut Self
    where
        F: FnOnce() -> Result<()>,
    {
        if let Err(err) = step() {
            tracing::warn!(step = label, error = %err, "cleanup step failed");
            self.failures += 1;
            self.last = Some(err);
        }
        self
    }

    /// Number of steps that failed so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// `Ok` if every step succeeded, otherwise the last failure.
    pub fn finish(self) -> Result<()> {
        match self.last {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
