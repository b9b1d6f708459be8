//! Join-key hash slot index.
//!
//! Maps each hash slot to the handles of the resident tuples whose key
//! hashes there. Slots hold handles in admission order, which gives the
//! total scan order required when several keys collide in one slot.
//! Collisions are expected: the slot table size is a tuning knob
//! independent of window capacity, and callers always confirm exact key
//! equality before treating a candidate as a match.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use super::queue::QueueHandle;
use super::WindowError;
use crate::tuple::JoinKey;

/// Handles stored inline per slot before spilling to the heap.
const INLINE_SLOT_ENTRIES: usize = 4;

type Slot = SmallVec<[QueueHandle; INLINE_SLOT_ENTRIES]>;

/// Multi-map from hash slot to resident queue handles.
pub struct WindowIndex {
    slots: Vec<Slot>,
    len: usize,
}

impl WindowIndex {
    /// Creates an index with `slot_count` hash slots.
    ///
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "WindowIndex requires at least one slot");
        Self {
            slots: (0..slot_count).map(|_| Slot::new()).collect(),
            len: 0,
        }
    }

    /// Slot for `key`.
    ///
    /// Uses `FxHash`, which is deterministic across runs, so slot
    /// assignment (and therefore collision behaviour) is reproducible.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn slot_of(&self, key: &JoinKey) -> usize {
        let mut hasher = FxHasher::default();
        hasher.write(key.as_bytes());
        (hasher.finish() % self.slots.len() as u64) as usize
    }

    /// Records `handle` under `slot`, after any handles already there.
    pub fn insert(&mut self, slot: usize, handle: QueueHandle) {
        self.slots[slot].push(handle);
        self.len += 1;
    }

    /// All handles in `slot`, oldest first. May include other keys.
    #[must_use]
    pub fn candidates(&self, slot: usize) -> &[QueueHandle] {
        self.slots.get(slot).map_or(&[][..], |s| s.as_slice())
    }

    /// Removes `handle` from `slot`, keeping the order of the rest.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::StaleIndex`] if the handle is not in the slot.
    pub fn remove(&mut self, slot: usize, handle: QueueHandle) -> Result<(), WindowError> {
        let entries = self
            .slots
            .get_mut(slot)
            .ok_or(WindowError::StaleIndex { slot })?;
        let pos = entries
            .iter()
            .position(|h| *h == handle)
            .ok_or(WindowError::StaleIndex { slot })?;
        entries.remove(pos);
        self.len -= 1;
        Ok(())
    }

    /// Total number of indexed handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of hash slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Removes every handle.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
        self.len = 0;
    }

    /// Occupancy of the fullest slot.
    #[must_use]
    pub fn max_slot_load(&self) -> usize {
        self.slots.iter().map(SmallVec::len).max().unwrap_or(0)
    }
}
