//! Arrival-ordered eviction queue with O(1) removal of arbitrary entries.
//!
//! The queue is a doubly-linked list threaded through a flat arena of
//! nodes. Links are arena indices, so there are no ownership cycles, and
//! detaching any node (head, tail or interior) is a constant number of
//! index writes.
//!
//! Freed arena slots are recycled. Each slot carries a generation counter
//! that is bumped on removal, so a [`QueueHandle`] to a removed entry is
//! detected as stale instead of silently aliasing the slot's next tenant.

use super::WindowError;

/// Stable reference to one queue position.
///
/// Only valid for the queue that returned it, and only until the entry is
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    index: usize,
    generation: u32,
}

impl QueueHandle {
    /// Arena slot of the handle.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    /// Generation of the handle.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    fn invalid(self) -> WindowError {
        WindowError::InvalidHandle {
            index: self.index,
            generation: self.generation,
        }
    }
}

struct Node<T> {
    /// `None` while the slot sits on the free list.
    value: Option<T>,
    generation: u32,
    prev: Option<usize>,
    next: Option<usize>,
}

/// FIFO queue supporting append, peek/pop of the oldest entry, and O(1)
/// removal of any entry by handle.
///
/// Removing an interior entry never perturbs the relative order of the
/// remaining entries.
pub struct EvictionQueue<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> EvictionQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty queue with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Appends `value` as the newest entry.
    pub fn append(&mut self, value: T) -> QueueHandle {
        let prev = self.tail;
        let index = if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index];
            node.value = Some(value);
            node.prev = prev;
            node.next = None;
            index
        } else {
            self.nodes.push(Node {
                value: Some(value),
                generation: 0,
                prev,
                next: None,
            });
            self.nodes.len() - 1
        };

        match prev {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        QueueHandle {
            index,
            generation: self.nodes[index].generation,
        }
    }

    /// Handle of the oldest entry.
    #[must_use]
    pub fn peek_oldest(&self) -> Option<QueueHandle> {
        self.head.map(|index| QueueHandle {
            index,
            generation: self.nodes[index].generation,
        })
    }

    /// Removes and returns the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<T> {
        let handle = self.peek_oldest()?;
        self.remove(handle).ok()
    }

    /// Removes the entry behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidHandle`] if the handle was never
    /// issued by this queue or its entry was already removed.
    pub fn remove(&mut self, handle: QueueHandle) -> Result<T, WindowError> {
        let node = self
            .nodes
            .get_mut(handle.index)
            .filter(|n| n.generation == handle.generation)
            .ok_or_else(|| handle.invalid())?;
        let value = node.value.take().ok_or_else(|| handle.invalid())?;
        let (prev, next) = (node.prev.take(), node.next.take());
        node.generation = node.generation.wrapping_add(1);

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        self.free.push(handle.index);
        self.len -= 1;
        Ok(value)
    }

    /// Entry behind `handle`, if it is still live.
    #[must_use]
    pub fn get(&self, handle: QueueHandle) -> Option<&T> {
        self.nodes
            .get(handle.index)
            .filter(|n| n.generation == handle.generation)
            .and_then(|n| n.value.as_ref())
    }

    /// Mutable access to the entry behind `handle`, if it is still live.
    pub fn get_mut(&mut self, handle: QueueHandle) -> Option<&mut T> {
        self.nodes
            .get_mut(handle.index)
            .filter(|n| n.generation == handle.generation)
            .and_then(|n| n.value.as_mut())
    }

    /// Whether `handle` refers to a live entry.
    #[must_use]
    pub fn contains(&self, handle: QueueHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates live entries oldest-first.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    /// Drops every entry and invalidates all outstanding handles.
    pub fn clear(&mut self) {
        while self.pop_oldest().is_some() {}
    }
}

impl<T> Default for EvictionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Oldest-first iterator over `(handle, entry)` pairs.
pub struct Iter<'a, T> {
    queue: &'a EvictionQueue<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (QueueHandle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let queue = self.queue;
        let node = &queue.nodes[index];
        self.cursor = node.next;
        let value = node.value.as_ref()?;
        Some((
            QueueHandle {
                index,
                generation: node.generation,
            },
            value,
        ))
    }
}
