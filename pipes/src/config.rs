use std::{env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Name pattern for the inbound FIFO of a duplex channel
pub const IN_PIPE_PATTERN: &str = "*.in.pipe";
/// Name pattern for the outbound FIFO of a duplex channel
pub const OUT_PIPE_PATTERN: &str = "*.out.pipe";
/// Name pattern for single pipes (Windows duplex, Unix read-write FIFO)
pub const PIPE_PATTERN: &str = "*.pipe";

/// Candidate name sets drawn before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const TMPDIR_ENV: &str = "DUPLEXPIPE_TMPDIR";
const MAX_ATTEMPTS_ENV: &str = "DUPLEXPIPE_MAX_ATTEMPTS";
const DIAL_TIMEOUT_ENV: &str = "DUPLEXPIPE_DIAL_TIMEOUT_MS";

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(windows)]
const PIPE_NAMESPACE: &str = r"\\.\pipe\";

fn default_temp_dir() -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(PIPE_NAMESPACE)
    }

    #[cfg(not(windows))]
    {
        env::temp_dir()
    }
}

/// Configuration shared by every pipe a factory creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Directory the pipe objects are created in
    pub temp_dir:     PathBuf,
    /// Candidate name sets drawn before failing with `NameExhausted`
    pub max_attempts: u32,
    /// How long a first write waits for the named-pipe server to appear
    /// (Windows only)
    pub dial_timeout: Duration,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            temp_dir:     default_temp_dir(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl PipeConfig {
    /// Creates a pipe configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables
    ///
    /// Reads DUPLEXPIPE_TMPDIR, DUPLEXPIPE_MAX_ATTEMPTS and
    /// DUPLEXPIPE_DIAL_TIMEOUT_MS. Unparsable or zero values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(dir) = env::var(TMPDIR_ENV) {
            if !dir.trim().is_empty() {
                config.temp_dir = PathBuf::from(dir);
            }
        }

        if let Some(attempts) = env::var(MAX_ATTEMPTS_ENV)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            config.max_attempts = attempts;
        }

        if let Some(millis) = env::var(DIAL_TIMEOUT_ENV)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
        {
            config.dial_timeout = Duration::from_millis(millis);
        }

        tracing::debug!(?config, "pipe configuration loaded from environment");
        config
    }

    /// Set the directory pipe objects are created in
    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, temp_dir: P) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Set the name attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the dial timeout
    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }
}
