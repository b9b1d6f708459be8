//! # Join Window
//!
//! The bounded set of stream tuples awaiting a secondary-store match.
//!
//! A [`Window`] combines two structures over the same resident tuples:
//!
//! - [`EvictionQueue`]: arrival order, used to pick the oldest keys to
//!   probe
//! - [`WindowIndex`]: hash slot → handles, used to find the tuples
//!   matching a probed key
//!
//! Every resident tuple has exactly one queue handle and appears exactly
//! once in its slot. The window mutates both structures and its
//! available-capacity counter together, so `occupied + avail == capacity`
//! holds between calls.
//!
//! The join coordinator is the window's only owner and writer.

mod index;
mod queue;

use rustc_hash::FxHashSet;

use crate::error_codes;
use crate::tuple::{ExpiredTuple, JoinKey, StreamTuple};

pub use index::WindowIndex;
pub use queue::{EvictionQueue, Iter, QueueHandle};

/// Window invariant violations.
///
/// All variants indicate a programming error in the caller or in the
/// window itself and are treated as fatal by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// Handle is unknown, stale, or already removed.
    #[error("[{code}] invalid queue handle (index {index}, generation {generation})", code = error_codes::INVALID_HANDLE)]
    InvalidHandle {
        /// Arena slot of the offending handle.
        index: usize,
        /// Generation of the offending handle.
        generation: u32,
    },

    /// Admission attempted with no available capacity.
    #[error("[{code}] window full: capacity {capacity} exhausted", code = error_codes::CAPACITY_VIOLATION)]
    CapacityViolation {
        /// Configured window capacity.
        capacity: usize,
    },

    /// Queue and slot index disagree.
    #[error("[{code}] slot index out of sync at slot {slot}", code = error_codes::STALE_INDEX)]
    StaleIndex {
        /// Slot where the disagreement was detected.
        slot: usize,
    },

    /// Occupancy and available capacity do not add up.
    #[error(
        "[{code}] capacity drift: occupied {occupied} + avail {avail} != capacity {capacity}",
        code = error_codes::CAPACITY_DRIFT
    )]
    CapacityDrift {
        /// Resident tuple count.
        occupied: usize,
        /// Available-capacity counter.
        avail: usize,
        /// Configured capacity.
        capacity: usize,
    },
}

/// A resident tuple as stored in the eviction queue.
struct Resident<T> {
    tuple: StreamTuple<T>,
    /// Back-reference to the tuple's slot in the index.
    slot: usize,
    admitted_round: u64,
    /// Lookups of this tuple's key that came back empty.
    misses: u64,
}

/// Read-only view of one resident tuple.
#[derive(Debug)]
pub struct WindowEntry<'a, T> {
    /// Queue handle of the entry.
    pub handle: QueueHandle,
    /// The resident tuple.
    pub tuple: &'a StreamTuple<T>,
    /// Round in which the tuple was admitted.
    pub admitted_round: u64,
    /// Lookups of the tuple's key that returned no record so far.
    pub misses: u64,
}

impl<T> Clone for WindowEntry<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WindowEntry<'_, T> {}

impl<'a, T> WindowEntry<'a, T> {
    fn from_resident(handle: QueueHandle, resident: &'a Resident<T>) -> Self {
        Self {
            handle,
            tuple: &resident.tuple,
            admitted_round: resident.admitted_round,
            misses: resident.misses,
        }
    }
}

/// Fixed-capacity join window.
pub struct Window<T> {
    queue: EvictionQueue<Resident<T>>,
    index: WindowIndex,
    capacity: usize,
    avail: usize,
}

impl<T> Window<T> {
    /// Creates an empty window holding at most `capacity` tuples, indexed
    /// over `hash_slots` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `hash_slots` is zero. Use
    /// [`JoinConfig::validate`](crate::JoinConfig::validate) to reject
    /// such values up front.
    #[must_use]
    pub fn new(capacity: usize, hash_slots: usize) -> Self {
        assert!(capacity > 0, "Window requires capacity > 0");
        Self {
            queue: EvictionQueue::with_capacity(capacity),
            index: WindowIndex::new(hash_slots),
            capacity,
            avail: capacity,
        }
    }

    /// Configured capacity (W).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident tuples.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.queue.len()
    }

    /// Unused capacity.
    #[must_use]
    pub fn avail(&self) -> usize {
        self.avail
    }

    /// Whether no tuple is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the window has no available capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.avail == 0
    }

    /// Number of hash slots in the index.
    #[must_use]
    pub fn hash_slots(&self) -> usize {
        self.index.slot_count()
    }

    /// Slot `key` hashes to.
    #[must_use]
    pub fn slot_of(&self, key: &JoinKey) -> usize {
        self.index.slot_of(key)
    }

    /// Admits `tuple` as the newest resident, tagging it with `round`.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::CapacityViolation`] if `avail == 0`; the
    /// window is left unchanged.
    pub fn admit(&mut self, tuple: StreamTuple<T>, round: u64) -> Result<QueueHandle, WindowError> {
        if self.avail == 0 {
            return Err(WindowError::CapacityViolation {
                capacity: self.capacity,
            });
        }
        let slot = self.index.slot_of(tuple.key());
        let handle = self.queue.append(Resident {
            tuple,
            slot,
            admitted_round: round,
            misses: 0,
        });
        self.index.insert(slot, handle);
        self.avail -= 1;
        Ok(handle)
    }

    /// Oldest resident entry.
    #[must_use]
    pub fn oldest(&self) -> Option<WindowEntry<'_, T>> {
        let handle = self.queue.peek_oldest()?;
        self.get(handle)
    }

    /// Key of the oldest resident tuple.
    #[must_use]
    pub fn oldest_key(&self) -> Option<&JoinKey> {
        self.oldest().map(|e| e.tuple.key())
    }

    /// Up to `limit` distinct keys, ordered by the arrival of their oldest
    /// resident tuple.
    ///
    /// Walks the queue from the oldest end and stops once `limit` distinct
    /// keys are found.
    #[must_use]
    pub fn oldest_distinct_keys(&self, limit: usize) -> Vec<JoinKey> {
        let mut keys = Vec::with_capacity(limit.min(self.occupied()));
        let mut seen: FxHashSet<&JoinKey> = FxHashSet::default();
        for (_, resident) in self.queue.iter() {
            if keys.len() >= limit {
                break;
            }
            let key = resident.tuple.key();
            if seen.insert(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Entry behind `handle`, if still resident.
    #[must_use]
    pub fn get(&self, handle: QueueHandle) -> Option<WindowEntry<'_, T>> {
        self.queue
            .get(handle)
            .map(|r| WindowEntry::from_resident(handle, r))
    }

    /// All entries sharing `key`'s hash slot, in arrival order.
    ///
    /// The slot may also hold colliding keys: callers must compare
    /// `entry.tuple.key()` against `key` before treating an entry as a
    /// match.
    pub fn candidates_for(&self, key: &JoinKey) -> impl Iterator<Item = WindowEntry<'_, T>> + '_ {
        let slot = self.index.slot_of(key);
        self.index
            .candidates(slot)
            .iter()
            .filter_map(move |h| self.get(*h))
    }

    /// Entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = WindowEntry<'_, T>> + '_ {
        self.queue
            .iter()
            .map(|(h, r)| WindowEntry::from_resident(h, r))
    }

    /// Removes the entry behind `handle` from both structures and returns
    /// its capacity to the window.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidHandle`] if the handle is not
    /// resident, or [`WindowError::StaleIndex`] if the slot index lost
    /// track of it. Either way nothing is removed.
    pub fn evict(&mut self, handle: QueueHandle) -> Result<StreamTuple<T>, WindowError> {
        let slot = self
            .queue
            .get(handle)
            .map(|r| r.slot)
            .ok_or(WindowError::InvalidHandle {
                index: handle.index(),
                generation: handle.generation(),
            })?;
        self.index.remove(slot, handle)?;
        let resident = self.queue.remove(handle)?;
        self.avail += 1;
        Ok(resident.tuple)
    }

    /// Evicts every resident tuple whose key equals `key`, oldest first.
    ///
    /// Colliding tuples with other keys in the same slot stay resident.
    ///
    /// # Errors
    ///
    /// Propagates [`evict`](Self::evict) failures.
    pub fn evict_key(&mut self, key: &JoinKey) -> Result<Vec<StreamTuple<T>>, WindowError> {
        let handles: Vec<QueueHandle> = self
            .candidates_for(key)
            .filter(|e| e.tuple.key() == key)
            .map(|e| e.handle)
            .collect();
        handles.into_iter().map(|h| self.evict(h)).collect()
    }

    /// Charges one miss to every resident tuple whose key equals `key`.
    ///
    /// Returns the number of tuples charged.
    pub fn record_miss(&mut self, key: &JoinKey) -> usize {
        let handles: Vec<QueueHandle> = self
            .candidates_for(key)
            .filter(|e| e.tuple.key() == key)
            .map(|e| e.handle)
            .collect();
        let mut charged = 0;
        for handle in handles {
            if let Some(resident) = self.queue.get_mut(handle) {
                resident.misses += 1;
                charged += 1;
            }
        }
        charged
    }

    /// Evicts, oldest first, every tuple with key `key` that has missed at
    /// least `max_misses` lookups.
    ///
    /// Tuples of other keys are never touched, however long they have been
    /// resident.
    ///
    /// # Errors
    ///
    /// Propagates [`evict`](Self::evict) failures.
    pub fn expire_key(
        &mut self,
        key: &JoinKey,
        current_round: u64,
        max_misses: u64,
    ) -> Result<Vec<ExpiredTuple<T>>, WindowError> {
        let stale: Vec<(QueueHandle, u64, u64)> = self
            .candidates_for(key)
            .filter(|e| e.tuple.key() == key && e.misses >= max_misses)
            .map(|e| (e.handle, e.admitted_round, e.misses))
            .collect();
        let mut expired = Vec::with_capacity(stale.len());
        for (handle, admitted_round, misses) in stale {
            let tuple = self.evict(handle)?;
            expired.push(ExpiredTuple {
                tuple,
                rounds_resident: current_round.saturating_sub(admitted_round) + 1,
                misses,
            });
        }
        Ok(expired)
    }

    /// Abandons every resident tuple, restoring full capacity.
    ///
    /// Returns the number of tuples dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.index.clear();
        self.avail = self.capacity;
        dropped
    }

    /// Verifies the window invariants.
    ///
    /// O(occupied × slot load); intended for tests and debug assertions.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), WindowError> {
        if self.occupied() + self.avail != self.capacity {
            return Err(WindowError::CapacityDrift {
                occupied: self.occupied(),
                avail: self.avail,
                capacity: self.capacity,
            });
        }
        for (handle, resident) in self.queue.iter() {
            let slot = resident.slot;
            if self.index.slot_of(resident.tuple.key()) != slot {
                return Err(WindowError::StaleIndex { slot });
            }
            let hits = self
                .index
                .candidates(slot)
                .iter()
                .filter(|h| **h == handle)
                .count();
            if hits != 1 {
                return Err(WindowError::StaleIndex { slot });
            }
        }
        if self.index.len() != self.queue.len() {
            return Err(WindowError::StaleIndex { slot: 0 });
        }
        Ok(())
    }
}
