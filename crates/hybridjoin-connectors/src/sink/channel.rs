//! Channel-forwarding sink.

use async_trait::async_trait;
use tokio::sync::mpsc;

use hybridjoin_core::{MatchSink, MatchedPair, SinkError};

/// Forwards matched pairs into a bounded `mpsc` channel.
///
/// A full channel applies backpressure to the join; a dropped receiver
/// turns every delivery into [`SinkError::Closed`].
pub struct ChannelSink<T, R> {
    tx: mpsc::Sender<MatchedPair<T, R>>,
}

impl<T, R> ChannelSink<T, R> {
    /// Creates a sink and the receiver it feeds.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MatchedPair<T, R>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub fn from_sender(tx: mpsc::Sender<MatchedPair<T, R>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl<T, R> MatchSink<T, R> for ChannelSink<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    async fn accept(&mut self, pair: MatchedPair<T, R>) -> Result<(), SinkError> {
        self.tx.send(pair).await.map_err(|_| SinkError::Closed)
    }

    fn sink_name(&self) -> &'static str {
        "channel"
    }
}
