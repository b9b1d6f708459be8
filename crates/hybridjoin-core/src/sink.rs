//! Output contracts for the join.
//!
//! - [`MatchSink`] receives every [`MatchedPair`]. Delivery is
//!   at-most-once: a failed `accept` is logged by the coordinator and the
//!   round goes on. The tuple stays evicted and is never re-delivered.
//! - [`UnmatchedSink`] receives tuples removed by the fallback residency
//!   policy (the dead-letter route).

use async_trait::async_trait;

use crate::error_codes;
use crate::tuple::{ExpiredTuple, MatchedPair};

/// Errors from sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The write failed.
    #[error("[{code}] write failed: {0}", code = error_codes::SINK_WRITE_FAILED)]
    Write(String),

    /// The sink is closed.
    #[error("[{code}] sink closed", code = error_codes::SINK_CLOSED)]
    Closed,

    /// The output could not be serialized.
    #[error("[{code}] serialization failed: {0}", code = error_codes::SINK_SERDE_FAILED)]
    Serde(String),
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Write(e.to_string())
    }
}

/// Destination for matched pairs.
#[async_trait]
pub trait MatchSink<T, R>: Send {
    /// Delivers one pair.
    ///
    /// # Errors
    ///
    /// Any error is logged and counted by the coordinator; the pair is not
    /// retried by the core.
    async fn accept(&mut self, pair: MatchedPair<T, R>) -> Result<(), SinkError>;

    /// Flushes buffered output. Called once when the coordinator stops.
    ///
    /// # Errors
    ///
    /// Returns the underlying write error.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Sink name for logging.
    fn sink_name(&self) -> &str {
        "match_sink"
    }
}

/// Destination for tuples evicted without a match.
#[async_trait]
pub trait UnmatchedSink<T>: Send {
    /// Delivers one expired tuple.
    ///
    /// # Errors
    ///
    /// Any error is logged and counted by the coordinator.
    async fn reject(&mut self, expired: ExpiredTuple<T>) -> Result<(), SinkError>;
}

/// Unmatched sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUnmatched;

#[async_trait]
impl<T: Send + 'static> UnmatchedSink<T> for LogUnmatched {
    async fn reject(&mut self, expired: ExpiredTuple<T>) -> Result<(), SinkError> {
        tracing::warn!(
            key = %expired.tuple.key(),
            rounds = expired.rounds_resident,
            misses = expired.misses,
            "Tuple expired without a match"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::StreamTuple;
    use std::sync::Arc;

    struct VecSink(Vec<MatchedPair<u32, String>>);

    #[async_trait]
    impl MatchSink<u32, String> for VecSink {
        async fn accept(&mut self, pair: MatchedPair<u32, String>) -> Result<(), SinkError> {
            self.0.push(pair);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_flush_is_noop() {
        let mut sink = VecSink(Vec::new());
        let pair = MatchedPair::new(
            Arc::new(StreamTuple::new("k1", 1u32)),
            Arc::new("rec".to_string()),
        );
        sink.accept(pair).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.sink_name(), "match_sink");
    }

    #[tokio::test]
    async fn test_log_unmatched_accepts() {
        let mut sink = LogUnmatched;
        let expired = ExpiredTuple {
            tuple: StreamTuple::new("k1", ()),
            rounds_resident: 3,
            misses: 2,
        };
        assert!(sink.reject(expired).await.is_ok());
    }

    #[test]
    fn test_io_error_maps_to_write() {
        let err: SinkError = std::io::Error::other("disk full").into();
        assert!(matches!(err, SinkError::Write(ref m) if m == "disk full"));
    }
}
