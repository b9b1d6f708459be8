//! Error types for the pipeline.

use hybridjoin_core::error_codes;
use hybridjoin_core::{ConfigError, JoinError};

/// Errors from starting or joining a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The join task stopped on a fatal error.
    #[error("join failed: {0}")]
    Join(#[from] JoinError),

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pipeline task panicked or was aborted.
    #[error("[{code}] {task} task failed: {reason}", code = error_codes::TASK_FAILED)]
    TaskFailed {
        /// Which task (`source` or `join`).
        task: &'static str,
        /// Panic or abort description.
        reason: String,
    },
}
