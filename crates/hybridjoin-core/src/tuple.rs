//! Stream tuples, join keys, and the output units of the join.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Opaque, comparable join key.
///
/// Keys compare by their exact byte content. The slot a key hashes to is
/// never used for equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JoinKey(Bytes);

impl JoinKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for JoinKey {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for JoinKey {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for JoinKey {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&[u8]> for JoinKey {
    fn from(v: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(v))
    }
}

impl From<u64> for JoinKey {
    fn from(v: u64) -> Self {
        Self(Bytes::copy_from_slice(&v.to_be_bytes()))
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// One tuple of the stream: a join key plus an opaque payload.
///
/// Arrival order is implicit (the order of admission into the window).
/// Tuples are never mutated once admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTuple<T> {
    key: JoinKey,
    payload: T,
}

impl<T> StreamTuple<T> {
    /// Creates a tuple.
    pub fn new(key: impl Into<JoinKey>, payload: T) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    /// The join key.
    #[must_use]
    pub fn key(&self) -> &JoinKey {
        &self.key
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Splits the tuple into key and payload.
    #[must_use]
    pub fn into_parts(self) -> (JoinKey, T) {
        (self.key, self.payload)
    }
}

/// A stream tuple joined with one secondary-store record.
///
/// A tuple matched by several records appears in several pairs sharing
/// the same `Arc`; it is evicted from the window only once.
#[derive(Debug)]
pub struct MatchedPair<T, R> {
    /// The evicted stream tuple.
    pub tuple: Arc<StreamTuple<T>>,
    /// The matching secondary-store record.
    pub record: Arc<R>,
}

impl<T, R> MatchedPair<T, R> {
    /// Creates a pair.
    #[must_use]
    pub fn new(tuple: Arc<StreamTuple<T>>, record: Arc<R>) -> Self {
        Self { tuple, record }
    }

    /// Join key of the pair.
    #[must_use]
    pub fn key(&self) -> &JoinKey {
        self.tuple.key()
    }
}

impl<T, R> Clone for MatchedPair<T, R> {
    fn clone(&self) -> Self {
        Self {
            tuple: Arc::clone(&self.tuple),
            record: Arc::clone(&self.record),
        }
    }
}

/// A tuple removed by the fallback residency policy without a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredTuple<T> {
    /// The expired stream tuple.
    pub tuple: StreamTuple<T>,
    /// Number of rounds the tuple stayed resident.
    pub rounds_resident: u64,
    /// Lookups of the tuple's key that returned no record.
    pub misses: u64,
}
