//! `HybridJoin` structured error code registry.
//!
//! Every fatal or configuration error carries a stable `HJ-NNNN` code that
//! is:
//! - Present in the error message (grep-able in logs)
//! - Present in the source code (grep-able in code)
//! - Stable across versions (codes are never reused)
//!
//! # Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | `HJ-0xxx` | General / configuration |
//! | `HJ-1xxx` | Window invariants |
//! | `HJ-2xxx` | Secondary-store probe |
//! | `HJ-3xxx` | Output sinks |
//! | `HJ-4xxx` | Stream sources |
//! | `HJ-5xxx` | Pipeline lifecycle |

// ── General / Configuration (HJ-0xxx) ──

/// Invalid configuration value.
pub const INVALID_CONFIG: &str = "HJ-0001";

// ── Window invariants (HJ-1xxx) ──

/// Handle is unknown, stale, or was already removed.
pub const INVALID_HANDLE: &str = "HJ-1001";
/// Admission would exceed the window capacity.
pub const CAPACITY_VIOLATION: &str = "HJ-1002";
/// Eviction queue and slot index disagree about a resident tuple.
pub const STALE_INDEX: &str = "HJ-1003";
/// Occupancy and available capacity no longer sum to the window capacity.
pub const CAPACITY_DRIFT: &str = "HJ-1004";

// ── Probe (HJ-2xxx) ──

/// Connection to the secondary store failed.
pub const PROBE_CONNECTION_FAILED: &str = "HJ-2001";
/// Lookup query failed.
pub const PROBE_QUERY_FAILED: &str = "HJ-2002";
/// Lookup timed out.
pub const PROBE_TIMEOUT: &str = "HJ-2003";
/// Secondary store not available.
pub const PROBE_NOT_AVAILABLE: &str = "HJ-2004";
/// Internal probe failure (codec, cache, ...).
pub const PROBE_INTERNAL: &str = "HJ-2005";

// ── Sinks (HJ-3xxx) ──

/// Sink write failed.
pub const SINK_WRITE_FAILED: &str = "HJ-3001";
/// Sink is closed.
pub const SINK_CLOSED: &str = "HJ-3002";
/// Output serialization failed.
pub const SINK_SERDE_FAILED: &str = "HJ-3003";

// ── Sources (HJ-4xxx) ──

/// Source read failed.
pub const SOURCE_IO_FAILED: &str = "HJ-4001";
/// Source record could not be decoded.
pub const SOURCE_DECODE_FAILED: &str = "HJ-4002";

// ── Pipeline (HJ-5xxx) ──

/// A pipeline task panicked or was aborted.
pub const TASK_FAILED: &str = "HJ-5001";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let codes = [
            INVALID_CONFIG,
            INVALID_HANDLE,
            CAPACITY_VIOLATION,
            STALE_INDEX,
            CAPACITY_DRIFT,
            PROBE_CONNECTION_FAILED,
            PROBE_QUERY_FAILED,
            PROBE_TIMEOUT,
            PROBE_NOT_AVAILABLE,
            PROBE_INTERNAL,
            SINK_WRITE_FAILED,
            SINK_CLOSED,
            SINK_SERDE_FAILED,
            SOURCE_IO_FAILED,
            SOURCE_DECODE_FAILED,
            TASK_FAILED,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
        assert!(codes.iter().all(|c| c.starts_with("HJ-") && c.len() == 7));
    }
}
