//! Join engine configuration.

use crate::error::ConfigError;

/// Configuration for a [`JoinCoordinator`](crate::JoinCoordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    /// Window capacity (W): the maximum number of resident stream tuples.
    pub window_capacity: usize,

    /// Number of hash slots in the window index.
    ///
    /// Independent of `window_capacity`. Fewer slots mean more collisions
    /// per slot (longer candidate scans), never wrong matches.
    pub hash_slots: usize,

    /// Keys handed to the probe per round.
    ///
    /// The coordinator selects this many distinct keys from the oldest end
    /// of the window. `1` degenerates to a point lookup per round.
    pub probe_batch_size: usize,

    /// Fallback eviction threshold, in missed lookups.
    ///
    /// Each round in which a tuple's key is selected and the store returns
    /// no record (or the lookup fails) counts as one miss. A tuple that
    /// reaches this many misses is evicted to the unmatched sink. Rounds
    /// spent waiting behind older keys do not count. `None` disables the
    /// fallback, in which case a key that never matches stays resident
    /// forever and can stall a full window.
    pub max_residency_rounds: Option<u64>,

    /// Emit a progress log line every this many rounds.
    pub progress_log_interval: u64,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            window_capacity: 10_000,
            hash_slots: 10_000,
            probe_batch_size: 1,
            max_residency_rounds: Some(64),
            progress_log_interval: 100,
        }
    }
}

impl JoinConfig {
    /// Checks that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::invalid("window_capacity", "must be > 0"));
        }
        if self.hash_slots == 0 {
            return Err(ConfigError::invalid("hash_slots", "must be > 0"));
        }
        if self.probe_batch_size == 0 {
            return Err(ConfigError::invalid("probe_batch_size", "must be > 0"));
        }
        if self.max_residency_rounds == Some(0) {
            return Err(ConfigError::invalid(
                "max_residency_rounds",
                "must be > 0 when set (use None to disable)",
            ));
        }
        if self.progress_log_interval == 0 {
            return Err(ConfigError::invalid("progress_log_interval", "must be > 0"));
        }
        Ok(())
    }
}
