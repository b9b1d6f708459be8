//! # `HybridJoin` Connectors
//!
//! Stream sources, secondary-store probes and sinks for the `HybridJoin`
//! engine.
//!
//! - [`source`]: [`StreamSource`] and its CSV and iterator implementations
//! - [`probe`]: [`MasterDataProbe`], a partitioned in-memory store with
//!   simulated read latency
//! - [`sink`]: JSON Lines and channel sinks
//! - [`testing`]: scripted probes and collecting sinks

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod probe;
pub mod sink;
pub mod source;
pub mod testing;

pub use probe::{MasterDataProbe, MasterDataProbeConfig};
pub use sink::{ChannelSink, JsonLinesSink};
pub use source::{CsvStreamSource, IterSource, SourceError, StreamSource};
