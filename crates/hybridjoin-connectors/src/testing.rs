//! Mock probes and sinks for tests and demos.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use hybridjoin_core::{
    DiskProbe, ExpiredTuple, JoinKey, MatchSink, MatchedPair, ProbeCapabilities, ProbeError,
    ProbeResult, SinkError, UnmatchedSink,
};

/// Scripted probe: fixed records per key, injectable failures, call log.
pub struct MockProbe<R> {
    data: FxHashMap<JoinKey, Vec<R>>,
    calls: Arc<Mutex<Vec<Vec<JoinKey>>>>,
    fail_next: Arc<AtomicUsize>,
    max_batch_size: usize,
}

impl<R: Clone + Send + Sync + 'static> MockProbe<R> {
    /// Creates an empty probe (every key misses).
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: FxHashMap::default(),
            calls: Arc::default(),
            fail_next: Arc::default(),
            max_batch_size: 0,
        }
    }

    /// Adds a record for `key`.
    #[must_use]
    pub fn with_record(mut self, key: impl Into<JoinKey>, record: R) -> Self {
        self.data.entry(key.into()).or_default().push(record);
        self
    }

    /// Sets the advertised batch limit.
    #[must_use]
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Handle to the log of keys passed to each `lookup`.
    #[must_use]
    pub fn calls(&self) -> Arc<Mutex<Vec<Vec<JoinKey>>>> {
        Arc::clone(&self.calls)
    }

    /// Handle that makes the next `n` lookups fail when set to `n`.
    #[must_use]
    pub fn fail_next(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fail_next)
    }
}

impl<R: Clone + Send + Sync + 'static> Default for MockProbe<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + Send + Sync + 'static> DiskProbe for MockProbe<R> {
    type Record = R;

    fn lookup(
        &self,
        keys: &[JoinKey],
    ) -> impl Future<Output = Result<ProbeResult<R>, ProbeError>> + Send {
        self.calls.lock().push(keys.to_vec());
        let failing = self
            .fail_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        let result = if failing {
            Err(ProbeError::Connection("injected failure".into()))
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
        "mock"
    }
}

/// Shared buffer of delivered pairs.
pub type Collected<T, R> = Arc<Mutex<Vec<MatchedPair<T, R>>>>;

/// Sink that keeps every pair.
pub struct CollectingSink<T, R> {
    pairs: Collected<T, R>,
    flushes: Arc<AtomicUsize>,
}

impl<T, R> CollectingSink<T, R> {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pairs: Arc::default(),
            flushes: Arc::default(),
        }
    }

    /// Handle to the collected pairs.
    #[must_use]
    pub fn pairs(&self) -> Collected<T, R> {
        Arc::clone(&self.pairs)
    }

    /// Handle to the flush counter.
    #[must_use]
    pub fn flushes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.flushes)
    }
}

impl<T, R> Default for CollectingSink<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T, R> MatchSink<T, R> for CollectingSink<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    async fn accept(&mut self, pair: MatchedPair<T, R>) -> Result<(), SinkError> {
        self.pairs.lock().push(pair);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "collecting"
    }
}

/// Sink that fails the first `n` deliveries, then collects.
pub struct FailingSink<T, R> {
    remaining_failures: usize,
    inner: CollectingSink<T, R>,
}

impl<T, R> FailingSink<T, R> {
    /// Fails the first `n` deliveries.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            remaining_failures: n,
            inner: CollectingSink::new(),
        }
    }

    /// Handle to the pairs delivered after the failures.
    #[must_use]
    pub fn pairs(&self) -> Collected<T, R> {
        self.inner.pairs()
    }
}

#[async_trait]
impl<T, R> MatchSink<T, R> for FailingSink<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    async fn accept(&mut self, pair: MatchedPair<T, R>) -> Result<(), SinkError> {
        if self.remaining_failures > 0 {
            self.remaining_failures -= 1;
            return Err(SinkError::Write("injected failure".into()));
        }
        self.inner.accept(pair).await
    }

    fn sink_name(&self) -> &'static str {
        "failing"
    }
}

/// Unmatched sink that keeps every expired tuple.
pub struct CollectingUnmatched<T> {
    expired: Arc<Mutex<Vec<ExpiredTuple<T>>>>,
}

impl<T> CollectingUnmatched<T> {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expired: Arc::default(),
        }
    }

    /// Handle to the collected tuples.
    #[must_use]
    pub fn expired(&self) -> Arc<Mutex<Vec<ExpiredTuple<T>>>> {
        Arc::clone(&self.expired)
    }
}

impl<T> Default for CollectingUnmatched<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> UnmatchedSink<T> for CollectingUnmatched<T> {
    async fn reject(&mut self, expired: ExpiredTuple<T>) -> Result<(), SinkError> {
        self.expired.lock().push(expired);
        Ok(())
    }
}
