//! Temporary pipe names.
//!
//! Names are drawn from a linear congruential sequence seeded from the clock
//! and the process id, so two processes starting at the same moment still
//! tend to pick different names. Uniqueness is best effort: a candidate set is
//! only accepted when none of its paths exist, but another process can still
//! create one of them before the caller does.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::{PipeError, Result};

// constants from Numerical Recipes
const MULTIPLIER: u32 = 1_664_525;
const INCREMENT: u32 = 1_013_904_223;

const TOKEN_MODULUS: u32 = 1_000_000_000;

/// A file name template: the last `*` is replaced by the random token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    prefix: String,
    suffix: String,
}

impl Pattern {
    /// Splits `pattern` at its last `*`. Without a `*` the token is appended.
    pub fn new(pattern: &str) -> Self {
        match pattern.rfind('*') {
            Some(pos) => Self {
                prefix: pattern[..pos].to_string(),
                suffix: pattern[pos + 1..].to_string(),
            },
            None => Self {
                prefix: pattern.to_string(),
                suffix: String::new(),
            },
        }
    }

    /// File name for `token`.
    pub fn render(&self, token: &str) -> String {
        format!("{}{}{}", self.prefix, token, self.suffix)
    }
}

impl From<&str> for Pattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.prefix, self.suffix)
    }
}

/// Source of candidate pipe names. Construct one per process and share it.
#[derive(Debug, Default)]
pub struct NameGenerator {
    state: Mutex<u32>,
}

impl NameGenerator {
    /// Creates a generator that seeds itself on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide generator every default factory draws from.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<NameGenerator>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    /// Creates a generator starting from a fixed state. A zero seed means
    /// "seed from the clock on first use".
    pub fn with_seed(seed: u32) -> Self {
        Self {
            state: Mutex::new(seed),
        }
    }

    fn reseed() -> u32 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0);
        nanos ^ std::process::id()
    }

    fn step(r: u32) -> u32 {
        r.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT)
    }

    /// Advances the sequence by exactly one step and returns the new value.
    fn advance(&self) -> u32 {
        // The counter is a plain integer; a panic elsewhere can't leave it torn.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut r = *state;
        if r == 0 {
            r = Self::reseed();
        }
        r = Self::step(r);
        *state = r;
        r
    }

    /// Next 9-digit decimal token.
    pub fn next_token(&self) -> String {
        format!("{:09}", self.advance() % TOKEN_MODULUS)
    }

    /// One candidate set: the same fresh token substituted into every
    /// pattern, joined onto `dir`.
    pub fn candidate_paths(&self, patterns: &[Pattern], dir: &Path) -> Vec<PathBuf> {
        let token = self.next_token();
        patterns
            .iter()
            .map(|pattern| dir.join(pattern.render(&token)))
            .collect()
    }

    /// Draws candidate sets until one has no existing path, up to
    /// `max_attempts` sets.
    pub fn reserve_unique_names(
        &self,
        patterns: &[Pattern],
        dir: &Path,
        max_attempts: u32,
    ) -> Result<Vec<PathBuf>> {
        fs::metadata(dir).map_err(|source| PipeError::TempDirUnavailable {
            path: dir.to_path_buf(),
            source,
        })?;

        for attempt in 1..=max_attempts {
            let paths = self.candidate_paths(patterns, dir);
            if paths_are_free(&paths) {
                tracing::debug!(?paths, attempt, "reserved pipe names");
                return Ok(paths);
            }
            tracing::debug!(?paths, attempt, "pipe name collision, drawing again");
        }

        Err(PipeError::NameExhausted {
            attempts: max_attempts,
        })
    }
}

/// True only when every path is non-empty and definitely absent. A probe
/// error other than "not found" counts as taken.
fn paths_are_free(paths: &[PathBuf]) -> bool {
    paths.iter().all(|path| {
        !path.as_os_str().is_empty()
            && matches!(
                fs::symlink_metadata(path),
                Err(ref e) if e.kind() == io::ErrorKind::NotFound
            )
    })
}
