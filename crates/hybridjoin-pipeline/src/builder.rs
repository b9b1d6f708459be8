//! Fluent builder for [`JoinPipeline`] construction.

use hybridjoin_connectors::StreamSource;
use hybridjoin_core::{DiskProbe, JoinConfig, MatchSink, UnmatchedSink};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::JoinPipeline;

/// Fluent builder for a [`JoinPipeline`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = JoinPipeline::builder()
///     .window_capacity(10_000)
///     .probe_batch_size(32)
///     .max_residency_rounds(Some(128))
///     .start(source, probe, sink)?;
/// let report = pipeline.await_drained().await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct JoinPipelineBuilder {
    config: PipelineConfig,
}

impl JoinPipelineBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the join settings.
    #[must_use]
    pub fn join_config(mut self, join: JoinConfig) -> Self {
        self.config.join = join;
        self
    }

    /// Set the window capacity (W).
    #[must_use]
    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.config.join.window_capacity = capacity;
        self
    }

    /// Set the number of hash slots.
    #[must_use]
    pub fn hash_slots(mut self, slots: usize) -> Self {
        self.config.join.hash_slots = slots;
        self
    }

    /// Set the number of keys probed per round.
    #[must_use]
    pub fn probe_batch_size(mut self, size: usize) -> Self {
        self.config.join.probe_batch_size = size;
        self
    }

    /// Set (or disable with `None`) the number of missed lookups after
    /// which an unmatched tuple is expired.
    #[must_use]
    pub fn max_residency_rounds(mut self, misses: Option<u64>) -> Self {
        self.config.join.max_residency_rounds = misses;
        self
    }

    /// Set how often progress is logged, in rounds.
    #[must_use]
    pub fn progress_log_interval(mut self, rounds: u64) -> Self {
        self.config.join.progress_log_interval = rounds;
        self
    }

    /// Set the ingestion channel capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the maximum tuples per source poll.
    #[must_use]
    pub fn max_poll_records(mut self, records: usize) -> Self {
        self.config.max_poll_records = records;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a setting is invalid.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Starts a pipeline with these settings.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a setting is invalid.
    pub fn start<T, S, P, K>(self, source: S, probe: P, sink: K) -> Result<JoinPipeline, PipelineError>
    where
        T: Send + Sync + 'static,
        S: StreamSource<T> + 'static,
        P: DiskProbe + 'static,
        K: MatchSink<T, P::Record> + 'static,
    {
        JoinPipeline::start(self.config, source, probe, sink)
    }

    /// Starts a pipeline that routes expired tuples to `unmatched`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a setting is invalid.
    pub fn start_with_unmatched<T, S, P, K, U>(
        self,
        source: S,
        probe: P,
        sink: K,
        unmatched: U,
    ) -> Result<JoinPipeline, PipelineError>
    where
        T: Send + Sync + 'static,
        S: StreamSource<T> + 'static,
        P: DiskProbe + 'static,
        K: MatchSink<T, P::Record> + 'static,
        U: UnmatchedSink<T> + 'static,
    {
        JoinPipeline::start_with_unmatched(self.config, source, probe, sink, unmatched)
    }
}
