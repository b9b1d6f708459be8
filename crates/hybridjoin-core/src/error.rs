//! Error types for the join engine.

use crate::error_codes;
use crate::window::WindowError;

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("[{code}] invalid config '{field}': {reason}", code = error_codes::INVALID_CONFIG)]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Fatal errors from the join coordinator.
///
/// Probe and sink failures are not here: they are logged, counted, and
/// the round carries on.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// A window invariant was violated. The coordinator stops.
    #[error("window invariant violated: {0}")]
    Window(#[from] WindowError),

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
