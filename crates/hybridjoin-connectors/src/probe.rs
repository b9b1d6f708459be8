//! Partitioned master-data probe.
//!
//! [`MasterDataProbe`] plays the role of the disk-resident relation: its
//! records are grouped into hash partitions, and every lookup "reads" each
//! partition it touches. A configurable per-partition latency stands in for
//! the I/O cost of a real store, which makes the probe useful for tuning
//! window size and probe batching without a database.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hybridjoin_connectors::probe::{MasterDataProbe, MasterDataProbeConfig};
//! use hybridjoin_core::JoinKey;
//!
//! # fn example() -> Result<(), hybridjoin_core::ProbeError> {
//! #[derive(Clone, serde::Deserialize)]
//! struct Customer { id: String, city: String }
//!
//! let probe = MasterDataProbe::load_csv(
//!     "customer_master_data.csv",
//!     MasterDataProbeConfig::default(),
//!     |c: &Customer| JoinKey::from(c.id.as_str()),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::hash::Hasher;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::de::DeserializeOwned;

use hybridjoin_core::{DiskProbe, JoinKey, ProbeCapabilities, ProbeError, ProbeResult};

/// Configuration for [`MasterDataProbe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterDataProbeConfig {
    /// Number of hash partitions (default: 64). Values below 1 are clamped.
    pub partitions: usize,

    /// Simulated read latency per partition touched by a lookup
    /// (default: zero).
    pub partition_latency: Duration,

    /// Maximum keys per lookup call (default: 500, 0 = unlimited).
    pub max_batch_size: usize,
}

impl Default for MasterDataProbeConfig {
    fn default() -> Self {
        Self {
            partitions: 64,
            partition_latency: Duration::ZERO,
            max_batch_size: 500,
        }
    }
}

/// In-memory, hash-partitioned implementation of [`DiskProbe`].
pub struct MasterDataProbe<R> {
    name: String,
    partitions: Vec<FxHashMap<JoinKey, Vec<R>>>,
    config: MasterDataProbeConfig,
    records: usize,
    /// Total lookups executed (for metrics).
    query_count: AtomicU64,
    /// Total records returned (for metrics).
    row_count: AtomicU64,
    /// Total partition reads (for metrics).
    partition_reads: AtomicU64,
}

impl<R> MasterDataProbe<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Creates an empty probe.
    #[must_use]
    pub fn new(name: impl Into<String>, config: MasterDataProbeConfig) -> Self {
        let count = config.partitions.max(1);
        Self {
            name: name.into(),
            partitions: (0..count).map(|_| FxHashMap::default()).collect(),
            config,
            records: 0,
            query_count: AtomicU64::new(0),
            row_count: AtomicU64::new(0),
            partition_reads: AtomicU64::new(0),
        }
    }

    /// Builds a probe from records, keyed by `key_fn`.
    pub fn from_records(
        name: impl Into<String>,
        config: MasterDataProbeConfig,
        records: impl IntoIterator<Item = R>,
        key_fn: impl Fn(&R) -> JoinKey,
    ) -> Self {
        let mut probe = Self::new(name, config);
        for record in records {
            probe.insert(key_fn(&record), record);
        }
        probe
    }

    /// Adds one record under `key`. Several records may share a key.
    pub fn insert(&mut self, key: JoinKey, record: R) {
        let partition = self.partition_of(&key);
        self.partitions[partition]
            .entry(key)
            .or_default()
            .push(record);
        self.records += 1;
    }

    /// Partition holding `key`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn partition_of(&self, key: &JoinKey) -> usize {
        let mut hasher = FxHasher::default();
        hasher.write(key.as_bytes());
        (hasher.finish() % self.partitions.len() as u64) as usize
    }

    /// Number of partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Number of records loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
    }

    /// Returns `true` if no records are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of distinct keys loaded.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.partitions.iter().map(FxHashMap::len).sum()
    }

    /// Returns the total number of lookups executed.
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Returns the total number of records returned.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.row_count.load(Ordering::Relaxed)
    }

    /// Returns the total number of partition reads.
    #[must_use]
    pub fn partition_reads(&self) -> u64 {
        self.partition_reads.load(Ordering::Relaxed)
    }
}

impl<R> MasterDataProbe<R>
where
    R: Clone + DeserializeOwned + Send + Sync + 'static,
{
    /// Loads records from a headed CSV file. Fields are trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotAvailable`] if the file cannot be read and
    /// [`ProbeError::Internal`] if a row fails to decode.
    pub fn load_csv(
        path: impl AsRef<Path>,
        config: MasterDataProbeConfig,
        key_fn: impl Fn(&R) -> JoinKey,
    ) -> Result<Self, ProbeError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| ProbeError::NotAvailable(format!("{}: {e}", path.display())))?;

        let mut probe = Self::new(path.display().to_string(), config);
        for (idx, row) in reader.deserialize::<R>().enumerate() {
            let record = row.map_err(|e| {
                ProbeError::Internal(format!("{} record {}: {e}", path.display(), idx + 1))
            })?;
            probe.insert(key_fn(&record), record);
        }

        tracing::info!(
            probe = %probe.name,
            records = probe.records,
            keys = probe.key_count(),
            partitions = probe.partitions.len(),
            "Master data loaded"
        );
        Ok(probe)
    }
}

impl<R> DiskProbe for MasterDataProbe<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Record = R;

    fn lookup(
        &self,
        keys: &[JoinKey],
    ) -> impl Future<Output = Result<ProbeResult<R>, ProbeError>> + Send {
        self.query_count.fetch_add(1, Ordering::Relaxed);

        let mut touched = FxHashSet::default();
        let mut found = ProbeResult::with_capacity(keys.len());
        let mut rows = 0u64;
        for key in keys {
            let partition = self.partition_of(key);
            touched.insert(partition);
            if let Some(records) = self.partitions[partition].get(key) {
                rows += records.len() as u64;
                found.insert(key.clone(), records.clone());
            }
        }
        self.row_count.fetch_add(rows, Ordering::Relaxed);
        self.partition_reads
            .fetch_add(touched.len() as u64, Ordering::Relaxed);

        #[allow(clippy::cast_possible_truncation)]
        let latency = self.config.partition_latency * touched.len() as u32;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(found)
        }
    }

    fn capabilities(&self) -> ProbeCapabilities {
        ProbeCapabilities {
            max_batch_size: self.config.max_batch_size,
        }
    }

    fn probe_name(&self) -> &str {
        &self.name
    }
}
