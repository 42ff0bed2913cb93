use std::{path::PathBuf, sync::Arc};

#[cfg(unix)]
use crate::{
    config::PIPE_PATTERN,
    endpoint::{AccessMode, Endpoint},
    error::PipeError,
};
use crate::{
    config::PipeConfig,
    duplex::{DuplexChannel, StreamNames},
    error::Result,
    name::{NameGenerator, Pattern},
    platform::{DefaultStrategy, PipeStrategy},
};

/// Builds duplex channels with unique names.
///
/// Factories built with [`PipeFactory::new`] all draw from the process-wide
/// [`NameGenerator`]; pass a generator to [`PipeFactory::with_generator`] to
/// inject a different one, e.g. a seeded generator in tests.
#[derive(Debug)]
pub struct PipeFactory<S = DefaultStrategy> {
    generator: Arc<NameGenerator>,
    config:    PipeConfig,
    strategy:  S,
}

impl PipeFactory<DefaultStrategy> {
    /// Creates a factory drawing from the process-wide
    /// [`NameGenerator::shared`] sequence.
    pub fn new(config: PipeConfig) -> Self {
        Self::with_generator(config, NameGenerator::shared())
    }

    /// Creates a factory drawing names from a shared generator
    pub fn with_generator(config: PipeConfig, generator: Arc<NameGenerator>) -> Self {
        let strategy = DefaultStrategy::from_config(&config);
        Self::with_strategy(config, generator, strategy)
    }
}

impl Default for PipeFactory<DefaultStrategy> {
    fn default() -> Self {
        Self::new(PipeConfig::default())
    }
}

impl<S: PipeStrategy> PipeFactory<S> {
    pub fn with_strategy(config: PipeConfig, generator: Arc<NameGenerator>, strategy: S) -> Self {
        Self {
            generator,
            config,
            strategy,
        }
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<NameGenerator> {
        &self.generator
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Reserves one unused path per pattern in the configured directory.
    pub fn reserve_names(&self, patterns: &[&str]) -> Result<Vec<PathBuf>> {
        let patterns: Vec<Pattern> = patterns.iter().map(|p| Pattern::new(p)).collect();
        self.generator
            .reserve_unique_names(&patterns, &self.config.temp_dir, self.config.max_attempts)
    }

    /// Creates the owning side of a new channel. Its [`DuplexChannel::names`]
    /// must reach the peer process, which joins with [`Self::connect`].
    pub fn make_duplex(&self) -> Result<DuplexChannel> {
        let paths = self.reserve_names(self.strategy.patterns())?;
        let channel = self.strategy.materialize(&paths)?;
        tracing::info!(names = %channel.names(), "created duplex channel");
        Ok(channel)
    }

    /// Joins a channel another process created and announced.
    pub fn connect(&self, names: &StreamNames) -> Result<DuplexChannel> {
        let channel = self.strategy.attach(names)?;
        tracing::info!(names = %channel.names(), "attached to duplex channel");
        Ok(channel)
    }

    /// Creates a single `<token>.pipe` FIFO opened read-write, usable from
    /// both ends within one process or as a one-way rendezvous point.
    #[cfg(unix)]
    pub fn temp_fifo(&self) -> Result<Endpoint> {
        let paths = self.reserve_names(&[PIPE_PATTERN])?;
        let [path] = paths.as_slice() else {
            return Err(PipeError::NameCount {
                expected: 1,
                got:      paths.len(),
            });
        };
        Endpoint::create(path, AccessMode::ReadWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn make_duplex_creates_both_fifos_in_temp_dir() {
        use std::os::unix::fs::FileTypeExt;

        let dir = tempfile::tempdir().unwrap();
        let factory = PipeFactory::new(PipeConfig::new().with_temp_dir(dir.path()));
        let channel = factory.make_duplex().unwrap();
        let names = channel.names().clone();

        for path in [&names.inbound, &names.outbound] {
            assert_eq!(path.parent(), Some(dir.path()));
            assert!(std::fs::symlink_metadata(path).unwrap().file_type().is_fifo());
        }
        let inbound = names.inbound.file_name().unwrap().to_str().unwrap();
        let outbound = names.outbound.file_name().unwrap().to_str().unwrap();
        assert!(inbound.ends_with(".in.pipe"));
        assert!(outbound.ends_with(".out.pipe"));
        assert_eq!(&inbound[..9], &outbound[..9]);

        channel.close().unwrap();
        assert!(!names.inbound.exists());
        assert!(!names.outbound.exists());
    }

    #[cfg(unix)]
    #[test]
    fn temp_fifo_is_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let factory = PipeFactory::new(PipeConfig::new().with_temp_dir(dir.path()));
        let fifo = factory.temp_fifo().unwrap();

        assert_eq!(fifo.mode(), AccessMode::ReadWrite);
        assert!(fifo.path().to_str().unwrap().ends_with(".pipe"));
        fifo.close().unwrap();
        assert!(!fifo.path().exists());
    }

    #[test]
    fn missing_temp_dir_fails_creation() {
        let dir = tempfile::tempdir().unwrap();
        let factory = PipeFactory::new(PipeConfig::new().with_temp_dir(dir.path().join("gone")));
        let err = factory.make_duplex().unwrap_err();
        assert!(matches!(err, crate::PipeError::TempDirUnavailable { .. }));
    }

    #[test]
    fn default_factories_share_the_process_generator() {
        let first = PipeFactory::new(PipeConfig::new());
        let second = PipeFactory::default();
        assert!(Arc::ptr_eq(first.generator(), second.generator()));
        assert!(Arc::ptr_eq(first.generator(), &NameGenerator::shared()));
    }

    #[test]
    fn factories_share_one_sequence() {
        let generator = Arc::new(NameGenerator::with_seed(5));
        let first = PipeFactory::with_generator(PipeConfig::new(), Arc::clone(&generator));
        let second = PipeFactory::with_generator(PipeConfig::new(), Arc::clone(&generator));

        let a = first.generator().next_token();
        let b = second.generator().next_token();
        assert_ne!(a, b);
        assert_eq!(Arc::strong_count(&generator), 3);
    }
}
