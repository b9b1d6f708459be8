//! Running pipeline handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hybridjoin_connectors::StreamSource;
use hybridjoin_core::{
    DiskProbe, JoinCoordinator, JoinError, JoinMetrics, JoinReport, LogUnmatched, MatchSink,
    MetricsSnapshot, UnmatchedSink,
};

use crate::builder::JoinPipelineBuilder;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::metrics::{SourceMetricsSnapshot, SourceTaskMetrics};
use crate::source_task::{spawn_source_task, SourceTaskHandle};

/// A started join: one source task feeding one join task.
///
/// The two tasks share a [`CancellationToken`]. [`request_stop`] cancels
/// it; the join task stops at its next round boundary and the source task
/// at its next poll or send.
///
/// [`request_stop`]: Self::request_stop
pub struct JoinPipeline {
    join: JoinHandle<Result<JoinReport, JoinError>>,
    source: SourceTaskHandle,
    cancel: CancellationToken,
    metrics: Arc<JoinMetrics>,
}

impl JoinPipeline {
    /// Returns a builder with default settings.
    #[must_use]
    pub fn builder() -> JoinPipelineBuilder {
        JoinPipelineBuilder::new()
    }

    /// Starts a pipeline. Expired tuples are logged.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `config` is invalid.
    pub fn start<T, S, P, K>(
        config: PipelineConfig,
        source: S,
        probe: P,
        sink: K,
    ) -> Result<Self, PipelineError>
    where
        T: Send + Sync + 'static,
        S: StreamSource<T> + 'static,
        P: DiskProbe + 'static,
        K: MatchSink<T, P::Record> + 'static,
    {
        Self::start_with_unmatched(config, source, probe, sink, LogUnmatched)
    }

    /// Starts a pipeline that routes expired tuples to `unmatched`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `config` is invalid.
    pub fn start_with_unmatched<T, S, P, K, U>(
        config: PipelineConfig,
        source: S,
        probe: P,
        sink: K,
        unmatched: U,
    ) -> Result<Self, PipelineError>
    where
        T: Send + Sync + 'static,
        S: StreamSource<T> + 'static,
        P: DiskProbe + 'static,
        K: MatchSink<T, P::Record> + 'static,
        U: UnmatchedSink<T> + 'static,
    {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let cancel = CancellationToken::new();
        let metrics = Arc::new(JoinMetrics::default());

        tracing::info!(
            source = %source.source_name(),
            probe = %probe.probe_name(),
            channel_capacity = config.channel_capacity,
            max_poll_records = config.max_poll_records,
            "Join pipeline starting"
        );

        let coordinator =
            JoinCoordinator::new(config.join.clone(), probe, Box::new(sink), rx, cancel.clone())?
                .with_unmatched_sink(Box::new(unmatched))
                .with_metrics(Arc::clone(&metrics));

        let source = spawn_source_task(
            source,
            tx,
            cancel.clone(),
            &config,
            Arc::new(SourceTaskMetrics::default()),
        );
        let join = tokio::spawn(coordinator.run());

        Ok(Self {
            join,
            source,
            cancel,
            metrics,
        })
    }

    /// Asks both tasks to stop. Resident tuples are abandoned.
    pub fn request_stop(&self) {
        tracing::info!("Join pipeline stop requested");
        self.cancel.cancel();
    }

    /// The token shared by both tasks, for composing with timeouts or
    /// signal handlers.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Join metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Source task metrics.
    #[must_use]
    pub fn source_metrics(&self) -> SourceMetricsSnapshot {
        self.source.metrics.snapshot()
    }

    /// Whether the join task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for both tasks and returns the join totals.
    ///
    /// Resolves once the source is exhausted and the window has drained,
    /// or after [`request_stop`](Self::request_stop).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Join`] if the join task hit a fatal error
    /// and [`PipelineError::TaskFailed`] if either task panicked.
    pub async fn await_drained(self) -> Result<JoinReport, PipelineError> {
        let report = match self.join.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                self.cancel.cancel();
                let _ = self.source.join.await;
                return Err(e.into());
            }
            Err(e) => {
                self.cancel.cancel();
                let _ = self.source.join.await;
                return Err(PipelineError::TaskFailed {
                    task: "join",
                    reason: e.to_string(),
                });
            }
        };

        let exit = self
            .source
            .join
            .await
            .map_err(|e| PipelineError::TaskFailed {
                task: "source",
                reason: e.to_string(),
            })?;

        let source = self.source.metrics.snapshot();
        tracing::info!(
            source_exit = ?exit,
            source_errors = source.errors,
            processed = source.forwarded,
            joined = report.matched,
            expired = report.expired,
            abandoned = report.abandoned,
            "Join pipeline finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridjoin_connectors::testing::{CollectingSink, CollectingUnmatched, MockProbe};
    use hybridjoin_connectors::IterSource;
    use hybridjoin_core::{JoinConfig, StreamTuple};

    fn small_config(max_residency_rounds: Option<u64>) -> PipelineConfig {
        PipelineConfig {
            join: JoinConfig {
                window_capacity: 8,
                hash_slots: 4,
                probe_batch_size: 2,
                max_residency_rounds,
                progress_log_interval: 10,
            },
            channel_capacity: 4,
            max_poll_records: 5,
        }
    }

    #[tokio::test]
    async fn test_pipeline_drains_all_matches() {
        let probe = MockProbe::new()
            .with_record("a", "rec-a")
            .with_record("b", "rec-b");
        let sink = CollectingSink::new();
        let pairs = sink.pairs();
        let flushes = sink.flushes();
        let source = IterSource::new(
            "gen",
            (0..50u32).map(|i| StreamTuple::new(if i % 2 == 0 { "a" } else { "b" }, i)),
        );

        let pipeline = JoinPipeline::start(small_config(None), source, probe, sink).unwrap();
        let report = pipeline.await_drained().await.unwrap();

        assert!(report.drained);
        assert_eq!(report.admitted, 50);
        assert_eq!(report.matched, 50);
        assert_eq!(pairs.lock().len(), 50);
        assert_eq!(flushes.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_pipeline_routes_expired_tuples() {
        let probe = MockProbe::new().with_record("a", 1u8);
        let unmatched = CollectingUnmatched::new();
        let expired = unmatched.expired();
        let source = IterSource::new(
            "gen",
            vec![
                StreamTuple::new("a", 1u32),
                StreamTuple::new("z", 2),
                StreamTuple::new("a", 3),
            ]
            .into_iter(),
        );

        let pipeline = JoinPipeline::start_with_unmatched(
            small_config(Some(2)),
            source,
            probe,
            CollectingSink::new(),
            unmatched,
        )
        .unwrap();
        let report = pipeline.await_drained().await.unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(report.expired, 1);
        let expired = expired.lock();
        assert_eq!(expired[0].tuple.payload(), &2);
    }

    #[tokio::test]
    async fn test_request_stop_abandons_window() {
        // No records: nothing ever matches and there is no fallback.
        let probe: MockProbe<u8> = MockProbe::new();
        let source = IterSource::new("gen", (0..3u32).map(|i| StreamTuple::new(u64::from(i), i)));

        let pipeline =
            JoinPipeline::start(small_config(None), source, probe, CollectingSink::new()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(pipeline.metrics().occupancy, 3);
        pipeline.request_stop();

        let report = pipeline.await_drained().await.unwrap();
        assert!(!report.drained);
        assert_eq!(report.abandoned, 3);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_spawn() {
        let mut config = small_config(None);
        config.max_poll_records = 0;
        let result = JoinPipeline::start(
            config,
            IterSource::new("gen", std::iter::empty::<StreamTuple<u32>>()),
            MockProbe::<u8>::new(),
            CollectingSink::new(),
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
