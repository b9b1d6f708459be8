//! Secondary-store probe contract.
//!
//! [`DiskProbe`] is the only way the join reaches the slow side of the
//! join. It uses RPITIT (Rust 1.75+) for zero-overhead async, so the
//! coordinator is generic over the probe and no boxing happens per call.
//!
//! ## Contract
//!
//! - `lookup` receives a batch of distinct keys (oldest first) and returns
//!   every matching record per key. Keys without a match are simply absent
//!   from the result.
//! - Lookups must be idempotent reads: the coordinator re-probes the same
//!   key on later rounds when it stays resident.
//! - The coordinator never holds window state across the await, so a slow
//!   probe only delays the join, never the producer.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error_codes;
use crate::tuple::JoinKey;

/// Records found per key. A missing key means no match.
pub type ProbeResult<R> = HashMap<JoinKey, Vec<R>>;

/// Errors from probe operations.
///
/// The coordinator treats every variant as "no match this round" for the
/// probed keys.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Connection to the secondary store failed.
    #[error("[{code}] connection failed: {0}", code = error_codes::PROBE_CONNECTION_FAILED)]
    Connection(String),

    /// Query execution failed.
    #[error("[{code}] query failed: {0}", code = error_codes::PROBE_QUERY_FAILED)]
    Query(String),

    /// The lookup timed out.
    #[error("[{code}] timeout after {0:?}", code = error_codes::PROBE_TIMEOUT)]
    Timeout(Duration),

    /// The store is not available (e.g. not loaded yet).
    #[error("[{code}] not available: {0}", code = error_codes::PROBE_NOT_AVAILABLE)]
    NotAvailable(String),

    /// Internal error (decode failure, cache I/O, ...).
    #[error("[{code}] internal: {0}", code = error_codes::PROBE_INTERNAL)]
    Internal(String),
}

/// Capabilities a probe advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeCapabilities {
    /// Maximum keys per `lookup` call (0 = unlimited).
    ///
    /// The coordinator splits larger key batches into chunks of this size.
    pub max_batch_size: usize,
}

impl ProbeCapabilities {
    /// Unlimited batch size.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Chunk length to use for `wanted` keys.
    #[must_use]
    pub fn chunk_len(&self, wanted: usize) -> usize {
        match self.max_batch_size {
            0 => wanted.max(1),
            max => max,
        }
    }
}

/// Async access to the secondary store.
pub trait DiskProbe: Send + Sync {
    /// Record type returned for a matching key.
    type Record: Send + Sync + 'static;

    /// Looks up all records for `keys`.
    fn lookup(
        &self,
        keys: &[JoinKey],
    ) -> impl Future<Output = Result<ProbeResult<Self::Record>, ProbeError>> + Send;

    /// Capabilities this probe advertises.
    fn capabilities(&self) -> ProbeCapabilities {
        ProbeCapabilities::unlimited()
    }

    /// Probe name for logging and metrics.
    fn probe_name(&self) -> &str;
}
