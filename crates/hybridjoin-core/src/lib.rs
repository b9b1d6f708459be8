//! # `HybridJoin` Core
//!
//! Bounded-memory join between a fast, ordered tuple stream and a slow
//! secondary store (the HYBRIDJOIN strategy).
//!
//! Stream tuples are buffered in a fixed-capacity [`Window`] that is
//! indexed twice: by join-key hash slot (for matching) and by arrival
//! order (for choosing which key to probe next). A single
//! [`JoinCoordinator`] task owns the window and repeats one round at a
//! time:
//!
//! ```text
//!  ingestion channel ──► Fill ──► Select oldest keys ──► Probe (DiskProbe)
//!                                                          │
//!            MatchSink ◄── Match & Evict ◄─────────────────┘
//!                               │
//!            UnmatchedSink ◄── Expire (optional fallback)
//! ```
//!
//! ## Module Overview
//!
//! - [`window`]: eviction queue, slot index and the `Window` aggregate
//! - [`probe`]: the `DiskProbe` contract for the secondary store
//! - [`sink`]: output contracts for matched pairs and expired tuples
//! - [`coordinator`]: the fill/select/probe/match/evict round engine
//! - [`error_codes`]: stable `HJ-NNNN` error code registry

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod error_codes;
pub mod metrics;
pub mod probe;
pub mod sink;
pub mod tuple;
pub mod window;

pub use config::JoinConfig;
pub use coordinator::{JoinCoordinator, JoinReport, RoundOutcome, RoundReport};
pub use error::{ConfigError, JoinError};
pub use metrics::{JoinMetrics, MetricsSnapshot};
pub use probe::{DiskProbe, ProbeCapabilities, ProbeError, ProbeResult};
pub use sink::{LogUnmatched, MatchSink, SinkError, UnmatchedSink};
pub use tuple::{ExpiredTuple, JoinKey, MatchedPair, StreamTuple};
pub use window::{EvictionQueue, QueueHandle, Window, WindowEntry, WindowError, WindowIndex};
