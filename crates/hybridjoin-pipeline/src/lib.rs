//! # `HybridJoin` Pipeline
//!
//! Wires a [`StreamSource`](hybridjoin_connectors::StreamSource), a
//! [`DiskProbe`](hybridjoin_core::DiskProbe) and a
//! [`MatchSink`](hybridjoin_core::MatchSink) into two tokio tasks:
//!
//! ```text
//! ┌──────────────┐   bounded mpsc    ┌──────────────────┐
//! │ Source task  │ ────────────────► │ Join task        │ ──► MatchSink
//! │ (poll_batch) │   backpressure    │ (JoinCoordinator)│ ──► UnmatchedSink
//! └──────────────┘                   └────────┬─────────┘
//!                                             │ lookup
//!                                             ▼
//!                                         DiskProbe
//! ```
//!
//! Each task owns its half exclusively (no `Arc<Mutex>`). The source task
//! ends when the source is exhausted; dropping its sender closes the
//! channel, and the join task drains the window before finishing.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod builder;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod source_task;

pub use builder::JoinPipelineBuilder;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use metrics::{SourceMetricsSnapshot, SourceTaskMetrics};
pub use pipeline::JoinPipeline;
pub use source_task::{spawn_source_task, SourceExit, SourceTaskHandle};
