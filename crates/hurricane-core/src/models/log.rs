//! Bounded append-only log.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;

/// A capped log that evicts its oldest entry once full.
///
/// Serializes as a plain JSON array. A deserialized log is unbounded until
/// [`RollingLog::set_capacity`] is called.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingLog<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RollingLog<T> {
    /// Creates an empty log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), items: VecDeque::new() }
    }

    /// Appends an entry, returning the evicted one if the log was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.capacity { self.items.pop_front() } else { None }
    }

    /// Changes the capacity, evicting the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Iterates mutably, oldest first.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.items.iter_mut()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }
}

impl<T> Default for RollingLog<T> {
    fn default() -> Self {
        Self { capacity: usize::MAX, items: VecDeque::new() }
    }
}

impl<T: Serialize> Serialize for RollingLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RollingLog<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = VecDeque::<T>::deserialize(deserializer)?;
        Ok(Self { capacity: usize::MAX, items })
    }
}
