//! Pipeline configuration.

use hybridjoin_core::{ConfigError, JoinConfig};

/// Configuration for a [`JoinPipeline`](crate::JoinPipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Join engine settings.
    pub join: JoinConfig,

    /// Capacity of the ingestion channel between the source task and the
    /// join task.
    ///
    /// A full channel stalls the source task (`tx.send().await`), so this
    /// bounds the tuples buffered outside the window.
    pub channel_capacity: usize,

    /// Maximum tuples per `poll_batch()` call.
    pub max_poll_records: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            join: JoinConfig::default(),
            channel_capacity: 1024,
            max_poll_records: 256,
        }
    }
}

impl PipelineConfig {
    /// Checks the pipeline and join settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.join.validate()?;
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid("channel_capacity", "must be > 0"));
        }
        if self.max_poll_records == 0 {
            return Err(ConfigError::invalid("max_poll_records", "must be > 0"));
        }
        Ok(())
    }
}
