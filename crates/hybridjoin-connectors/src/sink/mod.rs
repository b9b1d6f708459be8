//! Match sinks.

mod channel;
mod jsonl;

pub use channel::ChannelSink;
pub use jsonl::JsonLinesSink;
