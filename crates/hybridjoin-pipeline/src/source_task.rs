//! Source task with exclusive ownership of the stream source.
//!
//! The task polls the source in batches and sends tuples one at a time
//! through the bounded ingestion channel, so a full window (and therefore
//! a full channel) stalls the source instead of buffering without bound.
//! Dropping the sender when the task ends is what tells the join task
//! that ingestion is over.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hybridjoin_connectors::StreamSource;
use hybridjoin_core::StreamTuple;

use crate::config::PipelineConfig;
use crate::metrics::SourceTaskMetrics;

/// Why a source task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceExit {
    /// The source returned `None`.
    Exhausted,
    /// A stop was requested.
    Cancelled,
    /// The join task dropped the receiver.
    ReceiverDropped,
    /// The source returned an error. Ingestion ended early.
    Failed,
}

/// Handle returned when a source task is spawned.
pub struct SourceTaskHandle {
    /// Task join handle.
    pub join: tokio::task::JoinHandle<SourceExit>,
    /// Source metrics (lock-free atomic reads).
    pub metrics: Arc<SourceTaskMetrics>,
}

/// Spawns a task that polls `source` and sends tuples to `tx`.
///
/// The task ends on exhaustion, cancellation, a dropped receiver, or a
/// source error. A source error is logged and counted; the join task then
/// drains what was already ingested.
#[must_use]
pub fn spawn_source_task<T, S>(
    mut source: S,
    tx: mpsc::Sender<StreamTuple<T>>,
    cancel: CancellationToken,
    config: &PipelineConfig,
    metrics: Arc<SourceTaskMetrics>,
) -> SourceTaskHandle
where
    T: Send + 'static,
    S: StreamSource<T> + 'static,
{
    let metrics_tx = Arc::clone(&metrics);
    let max_poll = config.max_poll_records;

    let join = tokio::spawn(async move {
        let name = source.source_name().to_string();
        tracing::debug!(source = %name, "Source task started");

        let exit = loop {
            let poll_start = Instant::now();
            let polled = tokio::select! {
                biased;

                () = cancel.cancelled() => break SourceExit::Cancelled,

                polled = source.poll_batch(max_poll) => polled,
            };

            match polled {
                Ok(Some(batch)) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let latency_ns = poll_start.elapsed().as_nanos() as u64;
                    metrics_tx.record_poll(batch.len() as u64, latency_ns);

                    if let Some(exit) = forward(batch, &tx, &cancel, &metrics_tx).await {
                        break exit;
                    }
                }
                Ok(None) => break SourceExit::Exhausted,
                Err(e) => {
                    metrics_tx.record_error();
                    tracing::warn!(source = %name, error = %e, "Source poll error; ending ingestion");
                    break SourceExit::Failed;
                }
            }
        };

        let snap = metrics_tx.snapshot();
        match exit {
            SourceExit::Exhausted => tracing::info!(
                source = %name,
                tuples = snap.forwarded,
                "Source exhausted"
            ),
            SourceExit::ReceiverDropped => {
                tracing::debug!(source = %name, "Join task dropped, stopping");
            }
            SourceExit::Cancelled | SourceExit::Failed => tracing::debug!(
                source = %name,
                ?exit,
                tuples = snap.forwarded,
                "Source task stopped"
            ),
        }
        exit
    });

    SourceTaskHandle { join, metrics }
}

/// Sends a batch tuple by tuple. Returns `Some` if the task must stop.
async fn forward<T>(
    batch: Vec<StreamTuple<T>>,
    tx: &mpsc::Sender<StreamTuple<T>>,
    cancel: &CancellationToken,
    metrics: &SourceTaskMetrics,
) -> Option<SourceExit>
where
    T: Send,
{
    for tuple in batch {
        // Backpressure: a full channel parks the task here.
        let sent = tokio::select! {
            biased;

            () = cancel.cancelled() => return Some(SourceExit::Cancelled),

            sent = tx.send(tuple) => sent,
        };
        if sent.is_err() {
            return Some(SourceExit::ReceiverDropped);
        }
        metrics.record_forwarded();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hybridjoin_connectors::{IterSource, SourceError};
    use std::time::Duration;

    fn tuples(n: u32) -> impl Iterator<Item = StreamTuple<u32>> + Send {
        (0..n).map(|i| StreamTuple::new(u64::from(i % 3), i))
    }

    fn config(max_poll_records: usize) -> PipelineConfig {
        PipelineConfig {
            max_poll_records,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_source_task_forwards_all_tuples() {
        let (tx, mut rx) = mpsc::channel(4);
        let metrics = Arc::new(SourceTaskMetrics::default());
        let handle = spawn_source_task(
            IterSource::new("gen", tuples(10)),
            tx,
            CancellationToken::new(),
            &config(3),
            Arc::clone(&metrics),
        );

        let mut received = Vec::new();
        while let Some(tuple) = rx.recv().await {
            received.push(*tuple.payload());
        }
        assert_eq!(received, (0..10).collect::<Vec<_>>());
        assert_eq!(handle.join.await.unwrap(), SourceExit::Exhausted);

        let snap = metrics.snapshot();
        assert_eq!(snap.batches, 4);
        assert_eq!(snap.records, 10);
        assert_eq!(snap.forwarded, 10);
        assert_eq!(snap.errors, 0);
    }

    #[tokio::test]
    async fn test_source_task_cancel_while_backpressured() {
        // Channel of 1 and nobody reading: the task parks on send.
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = spawn_source_task(
            IterSource::new("gen", tuples(1_000)),
            tx,
            cancel.clone(),
            &config(16),
            Arc::new(SourceTaskMetrics::default()),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(handle.join.await.unwrap(), SourceExit::Cancelled);
        assert_eq!(handle.metrics.snapshot().forwarded, 1);
    }

    #[tokio::test]
    async fn test_source_task_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = spawn_source_task(
            IterSource::new("gen", tuples(5)),
            tx,
            CancellationToken::new(),
            &config(2),
            Arc::new(SourceTaskMetrics::default()),
        );
        assert_eq!(handle.join.await.unwrap(), SourceExit::ReceiverDropped);
    }

    /// Yields one batch, then fails.
    struct BrokenSource {
        polled: bool,
    }

    #[async_trait]
    impl StreamSource<u32> for BrokenSource {
        async fn poll_batch(
            &mut self,
            _max: usize,
        ) -> Result<Option<Vec<StreamTuple<u32>>>, SourceError> {
            if self.polled {
                return Err(SourceError::Decode {
                    record: 3,
                    message: "bad row".into(),
                });
            }
            self.polled = true;
            Ok(Some(vec![StreamTuple::new("a", 1), StreamTuple::new("b", 2)]))
        }

        fn source_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_source_error_ends_ingestion() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_source_task(
            BrokenSource { polled: false },
            tx,
            CancellationToken::new(),
            &config(8),
            Arc::new(SourceTaskMetrics::default()),
        );

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 2);
        assert_eq!(handle.join.await.unwrap(), SourceExit::Failed);
        assert_eq!(handle.metrics.snapshot().errors, 1);
    }
}
