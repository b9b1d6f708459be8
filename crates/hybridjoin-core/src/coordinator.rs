//! The HYBRIDJOIN round engine.
//!
//! [`JoinCoordinator`] is the single writer of the join window. It pulls
//! stream tuples from a bounded `mpsc` channel and repeats one round at a
//! time:
//!
//! 1. **Fill**: Non-blocking `try_recv()` while the window has capacity.
//!    Stops when `avail == 0` or the channel is momentarily empty.
//! 2. **Select**: If the window is empty, wait (zero CPU) for the next
//!    tuple or a stop request. Otherwise take up to `probe_batch_size`
//!    distinct keys from the oldest end of the window.
//! 3. **Probe**: Ask the [`DiskProbe`] for those keys, chunked to the
//!    probe's advertised batch limit. Window state is not borrowed across
//!    the await, so the producer keeps filling the channel meanwhile.
//! 4. **Match & Evict**: For each probed key with records, evict every
//!    resident tuple with exactly that key and hand one [`MatchedPair`]
//!    per (tuple, record) to the sink.
//! 5. **Expire**: Every probed key without records charges one miss to
//!    its resident tuples. With `max_residency_rounds` set, tuples that
//!    reach that many misses go to the [`UnmatchedSink`].
//!
//! Stop requests are honoured at round boundaries and while idle; an
//! in-flight probe always completes first.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::config::JoinConfig;
use crate::error::JoinError;
use crate::metrics::JoinMetrics;
use crate::probe::{DiskProbe, ProbeResult};
use crate::sink::{LogUnmatched, MatchSink, UnmatchedSink};
use crate::tuple::{JoinKey, MatchedPair, StreamTuple};
use crate::window::Window;

/// Result of one call to [`JoinCoordinator::run_round`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A full fill/select/probe/match/evict round ran.
    Progress(RoundReport),
    /// The window was empty; the coordinator waited and admitted one tuple.
    Idle,
    /// The producer is done and the window is empty.
    Drained,
    /// A stop was requested.
    Cancelled,
}

/// What happened during one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Round number (1-based).
    pub round: u64,
    /// Tuples admitted by the fill phase.
    pub admitted: usize,
    /// Keys handed to the probe, oldest first.
    pub probed_keys: Vec<JoinKey>,
    /// Probe calls that failed.
    pub probe_failures: usize,
    /// Tuples evicted by a match.
    pub matched_tuples: usize,
    /// Pairs accepted by the sink.
    pub emitted_pairs: usize,
    /// Pairs the sink failed to accept.
    pub sink_failures: usize,
    /// Tuples evicted by the residency fallback.
    pub expired: usize,
    /// Available capacity after the fill phase.
    pub avail_after_fill: usize,
    /// Available capacity at the end of the round.
    pub avail_after: usize,
}

impl RoundReport {
    /// Whether the round changed the window.
    #[must_use]
    pub fn made_progress(&self) -> bool {
        self.admitted > 0 || self.matched_tuples > 0 || self.expired > 0
    }
}

/// Totals for a whole coordinator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Rounds executed.
    pub rounds: u64,
    /// Tuples admitted.
    pub admitted: u64,
    /// Tuples evicted by a match.
    pub matched: u64,
    /// Pairs accepted by the sink.
    pub emitted_pairs: u64,
    /// Tuples evicted by the residency fallback.
    pub expired: u64,
    /// Tuples dropped from the window by a forced stop.
    pub abandoned: u64,
    /// `true` if the run ended because the producer finished and the
    /// window emptied, `false` if it was stopped.
    pub drained: bool,
}

/// Single-writer owner of the join window.
pub struct JoinCoordinator<T, P: DiskProbe> {
    config: JoinConfig,
    window: Window<T>,
    probe: P,
    sink: Box<dyn MatchSink<T, P::Record>>,
    unmatched: Box<dyn UnmatchedSink<T>>,
    rx: mpsc::Receiver<StreamTuple<T>>,
    cancel: CancellationToken,
    metrics: Arc<JoinMetrics>,
    round: u64,
    producer_done: bool,
    totals: JoinReport,
}

impl<T, P> JoinCoordinator<T, P>
where
    T: Send + Sync + 'static,
    P: DiskProbe,
{
    /// Creates a coordinator reading tuples from `rx`.
    ///
    /// Tuples expired by the residency fallback are logged unless an
    /// [`UnmatchedSink`] is installed with
    /// [`with_unmatched_sink`](Self::with_unmatched_sink).
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Config`] if `config` is invalid.
    pub fn new(
        config: JoinConfig,
        probe: P,
        sink: Box<dyn MatchSink<T, P::Record>>,
        rx: mpsc::Receiver<StreamTuple<T>>,
        cancel: CancellationToken,
    ) -> Result<Self, JoinError> {
        config.validate()?;
        let window = Window::new(config.window_capacity, config.hash_slots);
        let metrics = Arc::new(JoinMetrics::default());
        metrics.publish_window(window.occupied(), window.avail());

        Ok(Self {
            config,
            window,
            probe,
            sink,
            unmatched: Box::new(LogUnmatched),
            rx,
            cancel,
            metrics,
            round: 0,
            producer_done: false,
            totals: JoinReport::default(),
        })
    }

    /// Routes expired tuples to `sink`.
    #[must_use]
    pub fn with_unmatched_sink(mut self, sink: Box<dyn UnmatchedSink<T>>) -> Self {
        self.unmatched = sink;
        self
    }

    /// Reports into a shared metrics instance.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<JoinMetrics>) -> Self {
        metrics.publish_window(self.window.occupied(), self.window.avail());
        self.metrics = metrics;
        self
    }

    /// Shared metrics handle.
    #[must_use]
    pub fn metrics(&self) -> Arc<JoinMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The join window (read-only).
    #[must_use]
    pub fn window(&self) -> &Window<T> {
        &self.window
    }

    /// Number of rounds completed.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Whether the ingestion channel has been observed closed.
    #[must_use]
    pub fn is_producer_done(&self) -> bool {
        self.producer_done
    }

    /// Runs rounds until the producer is done and the window is empty, or
    /// until a stop is requested.
    ///
    /// On a forced stop, tuples still resident are abandoned and counted in
    /// [`JoinReport::abandoned`].
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Window`] if a window invariant breaks. This is
    /// a bug, and the coordinator stops immediately.
    pub async fn run(mut self) -> Result<JoinReport, JoinError> {
        tracing::info!(
            capacity = self.config.window_capacity,
            hash_slots = self.config.hash_slots,
            probe_batch_size = self.config.probe_batch_size,
            max_residency_rounds = ?self.config.max_residency_rounds,
            probe = %self.probe.probe_name(),
            sink = %self.sink.sink_name(),
            "Join coordinator started"
        );

        let drained = loop {
            let outcome = match self.run_round().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(round = self.round, error = %e, "Join coordinator aborted");
                    return Err(e);
                }
            };

            match outcome {
                RoundOutcome::Progress(report) => {
                    if report.round % self.config.progress_log_interval == 0 {
                        tracing::debug!(
                            round = report.round,
                            admitted = self.totals.admitted,
                            matched = self.totals.matched,
                            expired = self.totals.expired,
                            occupancy = self.window.occupied(),
                            avail = report.avail_after,
                            "Join processing"
                        );
                    }
                    if !report.made_progress() {
                        // Nothing matched or arrived: let the producer run.
                        tokio::task::yield_now().await;
                    }
                }
                RoundOutcome::Idle => {}
                RoundOutcome::Drained => break true,
                RoundOutcome::Cancelled => {
                    tracing::info!(round = self.round, "Join coordinator stop requested");
                    break false;
                }
            }
        };

        Ok(self.finish(drained).await)
    }

    /// Runs a single round.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Window`] on an invariant violation.
    pub async fn run_round(&mut self) -> Result<RoundOutcome, JoinError> {
        if self.cancel.is_cancelled() {
            return Ok(RoundOutcome::Cancelled);
        }
        let round = self.round + 1;

        // ── Phase 1: Fill (non-blocking, bounded by avail). ──
        let admitted = self.fill(round)?;

        // ── Phase 2: Select the oldest keys, or idle. ──
        if self.window.is_empty() {
            if self.producer_done {
                return Ok(RoundOutcome::Drained);
            }
            return self.idle_wait(round).await;
        }
        self.round = round;
        let avail_after_fill = self.window.avail();
        let keys = self
            .window
            .oldest_distinct_keys(self.config.probe_batch_size);

        // ── Phase 3: Probe. ──
        let (mut found, probe_failures) = probe_keys(&self.probe, &self.metrics, &keys).await;

        // ── Phase 4: Match & evict. ──
        let mut report = RoundReport {
            round,
            admitted,
            probe_failures,
            avail_after_fill,
            ..RoundReport::default()
        };
        let mut missed = Vec::new();
        for key in &keys {
            match found.remove(key) {
                Some(records) if !records.is_empty() => {
                    self.match_key(key, records, &mut report).await?;
                }
                _ => missed.push(key),
            }
        }

        // ── Phase 5: Residency fallback. ──
        // Only keys looked up this round are charged, so a tuple never
        // expires while it waits behind older keys.
        for key in missed {
            self.window.record_miss(key);
            if let Some(max_misses) = self.config.max_residency_rounds {
                self.expire(key, round, max_misses, &mut report).await?;
            }
        }

        debug_assert_eq!(
            self.window.occupied() + self.window.avail(),
            self.window.capacity()
        );
        report.probed_keys = keys;
        report.avail_after = self.window.avail();
        self.totals.rounds = round;
        self.metrics
            .publish_window(self.window.occupied(), self.window.avail());
        self.metrics.record_round();

        Ok(RoundOutcome::Progress(report))
    }

    /// Admits ready tuples until the window is full or the channel is empty.
    fn fill(&mut self, round: u64) -> Result<usize, JoinError> {
        let mut admitted = 0;
        while !self.producer_done && self.window.avail() > 0 {
            match self.rx.try_recv() {
                Ok(tuple) => {
                    self.admit(tuple, round)?;
                    admitted += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!(round, "Ingestion channel closed");
                    self.producer_done = true;
                }
            }
        }
        Ok(admitted)
    }

    fn admit(&mut self, tuple: StreamTuple<T>, round: u64) -> Result<(), JoinError> {
        self.window.admit(tuple, round)?;
        self.metrics.record_admitted();
        self.totals.admitted += 1;
        Ok(())
    }

    /// Waits for the next tuple while the window is empty.
    async fn idle_wait(&mut self, round: u64) -> Result<RoundOutcome, JoinError> {
        let next = tokio::select! {
            biased;

            () = self.cancel.cancelled() => return Ok(RoundOutcome::Cancelled),

            next = self.rx.recv() => next,
        };

        if let Some(tuple) = next {
            self.admit(tuple, round)?;
            Ok(RoundOutcome::Idle)
        } else {
            tracing::debug!(round, "Ingestion channel closed");
            self.producer_done = true;
            Ok(RoundOutcome::Drained)
        }
    }

    /// Evicts all tuples with `key` and emits one pair per record.
    async fn match_key(
        &mut self,
        key: &JoinKey,
        records: Vec<P::Record>,
        report: &mut RoundReport,
    ) -> Result<(), JoinError> {
        let evicted = self.window.evict_key(key)?;
        if evicted.is_empty() {
            return Ok(());
        }
        report.matched_tuples += evicted.len();
        self.metrics.record_matched(evicted.len() as u64);
        self.totals.matched += evicted.len() as u64;

        let records: Vec<Arc<P::Record>> = records.into_iter().map(Arc::new).collect();
        for tuple in evicted {
            let tuple = Arc::new(tuple);
            for record in &records {
                let pair = MatchedPair::new(Arc::clone(&tuple), Arc::clone(record));
                match self.sink.accept(pair).await {
                    Ok(()) => {
                        report.emitted_pairs += 1;
                        self.metrics.record_emitted();
                        self.totals.emitted_pairs += 1;
                    }
                    Err(e) => {
                        report.sink_failures += 1;
                        self.metrics.record_sink_failure();
                        tracing::warn!(
                            key = %key,
                            sink = %self.sink.sink_name(),
                            error = %e,
                            "Sink delivery failed; tuple stays evicted"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Moves tuples of `key` that reached the miss limit to the unmatched
    /// sink.
    async fn expire(
        &mut self,
        key: &JoinKey,
        round: u64,
        max_misses: u64,
        report: &mut RoundReport,
    ) -> Result<(), JoinError> {
        let expired = self.window.expire_key(key, round, max_misses)?;
        for item in expired {
            report.expired += 1;
            self.metrics.record_expired();
            self.totals.expired += 1;

            if let Err(e) = self.unmatched.reject(item).await {
                self.metrics.record_sink_failure();
                tracing::warn!(key = %key, error = %e, "Unmatched sink delivery failed");
            }
        }
        Ok(())
    }

    async fn finish(mut self, drained: bool) -> JoinReport {
        if let Err(e) = self.sink.flush().await {
            tracing::warn!(sink = %self.sink.sink_name(), error = %e, "Sink flush failed");
        }

        if !drained {
            let abandoned = self.window.clear();
            if abandoned > 0 {
                tracing::warn!(abandoned, "Abandoning resident tuples on stop");
            }
            self.totals.abandoned = abandoned as u64;
        }
        self.metrics
            .publish_window(self.window.occupied(), self.window.avail());
        self.totals.drained = drained;

        tracing::info!(
            rounds = self.totals.rounds,
            admitted = self.totals.admitted,
            matched = self.totals.matched,
            emitted_pairs = self.totals.emitted_pairs,
            expired = self.totals.expired,
            abandoned = self.totals.abandoned,
            drained,
            "Join coordinator stopped"
        );
        self.totals
    }
}

/// Probes `keys` in chunks of the probe's batch limit.
///
/// A failed chunk is logged and contributes no records: its keys stay
/// resident, are charged a miss, and are selected again in a later round.
async fn probe_keys<P: DiskProbe>(
    probe: &P,
    metrics: &JoinMetrics,
    keys: &[JoinKey],
) -> (ProbeResult<P::Record>, usize) {
    let mut found = ProbeResult::with_capacity(keys.len());
    let mut failures = 0;
    let chunk_len = probe.capabilities().chunk_len(keys.len());

    for chunk in keys.chunks(chunk_len) {
        match probe.lookup(chunk).await {
            Ok(records) => {
                metrics.record_probe(false);
                found.extend(records);
            }
            Err(e) => {
                metrics.record_probe(true);
                failures += 1;
                tracing::warn!(
                    probe = %probe.probe_name(),
                    keys = chunk.len(),
                    error = %e,
                    "Probe failed; keys stay resident"
                );
            }
        }
    }
    (found, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeCapabilities, ProbeError};
    use crate::sink::SinkError;
    use crate::tuple::ExpiredTuple;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::future::Future;
    use std::time::Duration;

    /// Probe with a fixed key → records map, a call log, and a failure switch.
    #[derive(Clone, Default)]
    struct ScriptedProbe {
        data: Arc<HashMap<JoinKey, Vec<String>>>,
        calls: Arc<Mutex<Vec<Vec<JoinKey>>>>,
        fail: Arc<Mutex<bool>>,
        max_batch_size: usize,
    }

    impl ScriptedProbe {
        fn with(entries: &[(&str, &[&str])]) -> Self {
            let data = entries
                .iter()
                .map(|(k, recs)| {
                    (
                        JoinKey::from(*k),
                        recs.iter().map(|r| (*r).to_string()).collect(),
                    )
                })
                .collect();
            Self {
                data: Arc::new(data),
                ..Self::default()
            }
        }
    }

    impl DiskProbe for ScriptedProbe {
        type Record = String;

        fn lookup(
            &self,
            keys: &[JoinKey],
        ) -> impl Future<Output = Result<ProbeResult<String>, ProbeError>> + Send {
            self.calls.lock().push(keys.to_vec());
            let result = if *self.fail.lock() {
                Err(ProbeError::Connection("store offline".into()))
            } else {
                Ok(keys
                    .iter()
                    .filter_map(|k| self.data.get(k).map(|v| (k.clone(), v.clone())))
                    .collect())
            };
            async move { result }
        }

        fn capabilities(&self) -> ProbeCapabilities {
            ProbeCapabilities {
                max_batch_size: self.max_batch_size,
            }
        }

        fn probe_name(&self) -> &'static str {
            "scripted"
        }
    }

    type Pairs = Arc<Mutex<Vec<(String, u32, String)>>>;

    /// Sink collecting (key, payload, record); fails the first `fail_first` calls.
    struct CollectSink {
        pairs: Pairs,
        fail_first: usize,
        calls: usize,
    }

    #[async_trait]
    impl MatchSink<u32, String> for CollectSink {
        async fn accept(&mut self, pair: MatchedPair<u32, String>) -> Result<(), SinkError> {
            self.calls += 1;
            if self.calls <= self.fail_first {
                return Err(SinkError::Write("injected".into()));
            }
            self.pairs.lock().push((
                pair.key().to_string(),
                *pair.tuple.payload(),
                (*pair.record).clone(),
            ));
            Ok(())
        }
    }

    struct CollectExpired(Arc<Mutex<Vec<ExpiredTuple<u32>>>>);

    #[async_trait]
    impl UnmatchedSink<u32> for CollectExpired {
        async fn reject(&mut self, expired: ExpiredTuple<u32>) -> Result<(), SinkError> {
            self.0.lock().push(expired);
            Ok(())
        }
    }

    struct Harness {
        coordinator: JoinCoordinator<u32, ScriptedProbe>,
        tx: Option<mpsc::Sender<StreamTuple<u32>>>,
        pairs: Pairs,
        cancel: CancellationToken,
    }

    fn harness(config: JoinConfig, probe: ScriptedProbe, fail_first: usize) -> Harness {
        let (tx, rx) = mpsc::channel(64);
        let pairs: Pairs = Arc::default();
        let sink = CollectSink {
            pairs: Arc::clone(&pairs),
            fail_first,
            calls: 0,
        };
        let cancel = CancellationToken::new();
        let coordinator =
            JoinCoordinator::new(config, probe, Box::new(sink), rx, cancel.clone()).unwrap();
        Harness {
            coordinator,
            tx: Some(tx),
            pairs,
            cancel,
        }
    }

    impl Harness {
        async fn send(&self, key: &str, payload: u32) {
            self.tx
                .as_ref()
                .unwrap()
                .send(StreamTuple::new(key, payload))
                .await
                .unwrap();
        }

        fn close(&mut self) {
            self.tx = None;
        }

        async fn progress(&mut self) -> RoundReport {
            match self.coordinator.run_round().await.unwrap() {
                RoundOutcome::Progress(r) => r,
                other => panic!("expected progress, got {other:?}"),
            }
        }
    }

    fn config(capacity: usize) -> JoinConfig {
        JoinConfig {
            window_capacity: capacity,
            hash_slots: 16,
            probe_batch_size: 1,
            max_residency_rounds: None,
            progress_log_interval: 1,
        }
    }

    #[tokio::test]
    async fn test_round_cycle_determinism() {
        let probe = ScriptedProbe::with(&[("k1", &["rec-k1"])]);
        let mut h = harness(config(2), probe, 0);
        h.send("k1", 1).await; // A
        h.send("k2", 2).await; // B
        h.close();

        // Round 1: fill A and B, probe k1, evict A.
        let r1 = h.progress().await;
        assert_eq!(r1.round, 1);
        assert_eq!(r1.admitted, 2);
        assert_eq!(r1.avail_after_fill, 0);
        assert_eq!(r1.probed_keys, vec![JoinKey::from("k1")]);
        assert_eq!(r1.matched_tuples, 1);
        assert_eq!(r1.avail_after, 1);
        assert_eq!(
            *h.pairs.lock(),
            vec![("k1".to_string(), 1, "rec-k1".to_string())]
        );

        // Round 2: nothing to fill, probe k2, no record, no eviction.
        let r2 = h.progress().await;
        assert_eq!(r2.admitted, 0);
        assert_eq!(r2.probed_keys, vec![JoinKey::from("k2")]);
        assert_eq!(r2.matched_tuples, 0);
        assert_eq!(r2.avail_after, 1);
        assert!(!r2.made_progress());
        assert!(h.coordinator.is_producer_done());

        // Without a fallback, k2 is re-selected forever.
        let r3 = h.progress().await;
        assert_eq!(r3.probed_keys, vec![JoinKey::from("k2")]);
        assert_eq!(h.coordinator.window().occupied(), 1);
        h.coordinator.window().check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_fill_never_exceeds_avail() {
        let probe = ScriptedProbe::default();
        let mut h = harness(config(3), probe, 0);
        for i in 0..5 {
            h.send("k", i).await;
        }

        let r = h.progress().await;
        assert_eq!(r.admitted, 3);
        assert_eq!(r.avail_after_fill, 0);
        assert_eq!(h.coordinator.window().occupied(), 3);

        // Full window: the next round admits nothing.
        let r = h.progress().await;
        assert_eq!(r.admitted, 0);
        assert_eq!(h.coordinator.metrics().snapshot().admitted, 3);
    }

    #[tokio::test]
    async fn test_collision_partner_not_matched() {
        let probe = ScriptedProbe::with(&[("alpha", &["A"])]);
        let mut cfg = config(4);
        cfg.hash_slots = 1;
        let mut h = harness(cfg, probe, 0);
        h.send("alpha", 1).await;
        h.send("beta", 2).await;
        h.send("alpha", 3).await;

        let r = h.progress().await;
        assert_eq!(r.matched_tuples, 2);
        let window = h.coordinator.window();
        assert_eq!(window.occupied(), 1);
        assert_eq!(window.oldest_key(), Some(&JoinKey::from("beta")));
        let keys: Vec<String> = h.pairs.lock().iter().map(|p| p.0.clone()).collect();
        assert_eq!(keys, vec!["alpha", "alpha"]);
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_key_resident() {
        let probe = ScriptedProbe::with(&[("k1", &["r"])]);
        *probe.fail.lock() = true;
        let fail = Arc::clone(&probe.fail);
        let mut h = harness(config(2), probe, 0);
        h.send("k1", 1).await;

        let r = h.progress().await;
        assert_eq!(r.probe_failures, 1);
        assert_eq!(r.matched_tuples, 0);
        assert_eq!(h.coordinator.window().occupied(), 1);

        // Store recovers: the same key is re-selected and matches.
        *fail.lock() = false;
        let r = h.progress().await;
        assert_eq!(r.probed_keys, vec![JoinKey::from("k1")]);
        assert_eq!(r.matched_tuples, 1);

        let snap = h.coordinator.metrics().snapshot();
        assert_eq!(snap.probe_calls, 2);
        assert_eq!(snap.probe_failures, 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_roll_back_eviction() {
        let probe = ScriptedProbe::with(&[("k1", &["r"])]);
        let mut h = harness(config(2), probe, 1);
        h.send("k1", 1).await;

        let r = h.progress().await;
        assert_eq!(r.matched_tuples, 1);
        assert_eq!(r.sink_failures, 1);
        assert_eq!(r.emitted_pairs, 0);
        assert!(h.coordinator.window().is_empty());
        assert_eq!(h.coordinator.window().avail(), 2);

        let snap = h.coordinator.metrics().snapshot();
        assert_eq!(snap.matched, 1);
        assert_eq!(snap.sink_failures, 1);
    }

    #[tokio::test]
    async fn test_each_record_yields_a_pair() {
        let probe = ScriptedProbe::with(&[("k1", &["r1", "r2"])]);
        let mut h = harness(config(4), probe, 0);
        h.send("k1", 7).await;

        let r = h.progress().await;
        assert_eq!(r.matched_tuples, 1);
        assert_eq!(r.emitted_pairs, 2);
        let records: Vec<String> = h.pairs.lock().iter().map(|p| p.2.clone()).collect();
        assert_eq!(records, vec!["r1", "r2"]);
        assert_eq!(h.coordinator.metrics().snapshot().matched, 1);
    }

    #[tokio::test]
    async fn test_batch_probe_selects_oldest_distinct_keys() {
        let probe = ScriptedProbe::with(&[("k1", &["a"]), ("k2", &["b"]), ("k3", &["c"])]);
        let calls = Arc::clone(&probe.calls);
        let mut cfg = config(8);
        cfg.probe_batch_size = 2;
        let mut h = harness(cfg, probe, 0);
        for k in ["k1", "k1", "k2", "k3"] {
            h.send(k, 0).await;
        }

        let r = h.progress().await;
        assert_eq!(r.probed_keys, vec![JoinKey::from("k1"), JoinKey::from("k2")]);
        assert_eq!(r.matched_tuples, 3);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(h.coordinator.window().oldest_key(), Some(&JoinKey::from("k3")));
    }

    #[tokio::test]
    async fn test_probe_chunks_follow_capabilities() {
        let mut probe = ScriptedProbe::with(&[("k1", &["a"]), ("k2", &["b"]), ("k3", &["c"])]);
        probe.max_batch_size = 1;
        let calls = Arc::clone(&probe.calls);
        let mut cfg = config(8);
        cfg.probe_batch_size = 3;
        let mut h = harness(cfg, probe, 0);
        for k in ["k1", "k2", "k3"] {
            h.send(k, 0).await;
        }

        let r = h.progress().await;
        assert_eq!(r.matched_tuples, 3);
        assert_eq!(calls.lock().len(), 3);
        assert!(calls.lock().iter().all(|c| c.len() == 1));
    }

    #[tokio::test]
    async fn test_residency_fallback_expires_unmatched() {
        let probe = ScriptedProbe::with(&[("k1", &["rec"])]);
        let mut cfg = config(2);
        cfg.max_residency_rounds = Some(3);
        let (tx, rx) = mpsc::channel(8);
        let expired: Arc<Mutex<Vec<ExpiredTuple<u32>>>> = Arc::default();
        let pairs: Pairs = Arc::default();
        let sink = CollectSink {
            pairs: Arc::clone(&pairs),
            fail_first: 0,
            calls: 0,
        };
        let coordinator =
            JoinCoordinator::new(cfg, probe, Box::new(sink), rx, CancellationToken::new())
                .unwrap()
                .with_unmatched_sink(Box::new(CollectExpired(Arc::clone(&expired))));

        tx.send(StreamTuple::new("k1", 1)).await.unwrap();
        tx.send(StreamTuple::new("k2", 2)).await.unwrap();
        drop(tx);

        // Round 1 matches k1; k2 misses in rounds 2, 3 and 4.
        let report = coordinator.run().await.unwrap();
        assert!(report.drained);
        assert_eq!(report.matched, 1);
        assert_eq!(report.expired, 1);
        assert_eq!(report.rounds, 4);
        let expired = expired.lock();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].tuple.key(), &JoinKey::from("k2"));
        assert_eq!(expired[0].misses, 3);
        assert_eq!(expired[0].rounds_resident, 4);
    }

    #[tokio::test]
    async fn test_waiting_behind_older_keys_is_not_a_miss() {
        // More distinct keys than the miss limit, one key per round, and
        // every key has a record: nothing may expire.
        const KEYS: u32 = 200;
        const REC: &[&str] = &["rec"];
        let names: Vec<String> = (0..KEYS).map(|i| format!("c{i}")).collect();
        let records: Vec<(&str, &[&str])> = names.iter().map(|n| (n.as_str(), REC)).collect();
        let probe = ScriptedProbe::with(&records);
        let cfg = JoinConfig {
            window_capacity: KEYS as usize,
            hash_slots: KEYS as usize,
            ..JoinConfig::default()
        };
        assert!(cfg.max_residency_rounds.is_some_and(|m| m < u64::from(KEYS)));

        let (tx, rx) = mpsc::channel(KEYS as usize);
        let expired: Arc<Mutex<Vec<ExpiredTuple<u32>>>> = Arc::default();
        let pairs: Pairs = Arc::default();
        let sink = CollectSink {
            pairs: Arc::clone(&pairs),
            fail_first: 0,
            calls: 0,
        };
        let coordinator =
            JoinCoordinator::new(cfg, probe, Box::new(sink), rx, CancellationToken::new())
                .unwrap()
                .with_unmatched_sink(Box::new(CollectExpired(Arc::clone(&expired))));

        for (i, name) in names.iter().enumerate() {
            tx.send(StreamTuple::new(name.as_str(), u32::try_from(i).unwrap()))
                .await
                .unwrap();
        }
        drop(tx);

        let report = coordinator.run().await.unwrap();
        assert!(report.drained);
        assert_eq!(report.matched, u64::from(KEYS));
        assert_eq!(report.expired, 0);
        assert!(expired.lock().is_empty());
        assert_eq!(pairs.lock().len(), KEYS as usize);
    }

    #[tokio::test]
    async fn test_failed_lookup_counts_toward_expiry() {
        let probe = ScriptedProbe::with(&[("k1", &["r"])]);
        *probe.fail.lock() = true;
        let mut cfg = config(2);
        cfg.max_residency_rounds = Some(2);
        let mut h = harness(cfg, probe, 0);
        h.send("k1", 1).await;

        assert_eq!(h.progress().await.expired, 0);
        let r = h.progress().await;
        assert_eq!(r.probe_failures, 1);
        assert_eq!(r.expired, 1);
        assert!(h.coordinator.window().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_and_stops() {
        let probe = ScriptedProbe::with(&[("a", &["ra"]), ("b", &["rb"])]);
        let mut cfg = config(4);
        cfg.probe_batch_size = 2;
        let h = harness(cfg, probe, 0);
        let tx = h.tx.clone().unwrap();
        let pairs = Arc::clone(&h.pairs);
        let metrics = h.coordinator.metrics();

        let producer = tokio::spawn(async move {
            for i in 0..100u32 {
                let key = if i % 2 == 0 { "a" } else { "b" };
                tx.send(StreamTuple::new(key, i)).await.unwrap();
            }
        });
        let Harness { coordinator, tx, .. } = h;
        drop(tx);

        let report = coordinator.run().await.unwrap();
        producer.await.unwrap();

        assert!(report.drained);
        assert_eq!(report.admitted, 100);
        assert_eq!(report.matched, 100);
        assert_eq!(report.abandoned, 0);
        assert_eq!(pairs.lock().len(), 100);

        let snap = metrics.snapshot();
        assert_eq!(snap.occupancy, 0);
        assert_eq!(snap.avail, 4);
    }

    #[tokio::test]
    async fn test_stop_abandons_resident_tuples() {
        let probe = ScriptedProbe::default();
        let h = harness(config(4), probe, 0);
        h.send("never", 1).await;
        let cancel = h.cancel.clone();
        let Harness {
            coordinator, tx, ..
        } = h;

        let task = tokio::spawn(coordinator.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = task.await.unwrap().unwrap();
        assert!(!report.drained);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.matched, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_idle_wait_wakes_on_arrival() {
        let probe = ScriptedProbe::with(&[("k1", &["r"])]);
        let mut h = harness(config(2), probe, 0);
        let tx = h.tx.clone().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(StreamTuple::new("k1", 5)).await.unwrap();
        });

        let outcome = h.coordinator.run_round().await.unwrap();
        assert_eq!(outcome, RoundOutcome::Idle);
        assert_eq!(h.coordinator.round(), 0);

        let r = h.progress().await;
        assert_eq!(r.round, 1);
        assert_eq!(r.matched_tuples, 1);
    }

    #[tokio::test]
    async fn test_idle_wait_honours_cancel() {
        let probe = ScriptedProbe::default();
        let mut h = harness(config(2), probe, 0);
        h.cancel.cancel();
        assert_eq!(
            h.coordinator.run_round().await.unwrap(),
            RoundOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn test_closed_empty_channel_is_drained() {
        let probe = ScriptedProbe::default();
        let mut h = harness(config(2), probe, 0);
        h.close();
        assert_eq!(
            h.coordinator.run_round().await.unwrap(),
            RoundOutcome::Drained
        );
        assert!(h.coordinator.is_producer_done());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (_tx, rx) = mpsc::channel::<StreamTuple<u32>>(1);
        let sink = CollectSink {
            pairs: Arc::default(),
            fail_first: 0,
            calls: 0,
        };
        let result = JoinCoordinator::new(
            JoinConfig {
                window_capacity: 0,
                ..JoinConfig::default()
            },
            ScriptedProbe::default(),
            Box::new(sink),
            rx,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(JoinError::Config(_))));
    }
}
