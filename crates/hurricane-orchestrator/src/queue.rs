//! Ready queue.
//!
//! Orders ready tasks for dispatch: highest priority first, then earliest
//! creation, then lowest board sequence.

use chrono::{DateTime, Utc};
use hurricane_core::{Priority, Task};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Entry in the ready queue.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    created_at: DateTime<Utc>,
    sequence: u64,
    task_id: String,
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority is greater, older is greater
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

/// Priority queue of task ids awaiting dispatch.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<ReadyEntry>,
}

impl ReadyQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task.
    pub fn push(&mut self, task: &Task) {
        self.heap.push(ReadyEntry {
            priority: task.priority,
            created_at: task.created_at,
            sequence: task.sequence,
            task_id: task.id.clone(),
        });
    }

    /// Removes and returns the task id that should dispatch next.
    pub fn pop(&mut self) -> Option<String> {
        self.heap.pop().map(|entry| entry.task_id)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<'a> FromIterator<&'a Task> for ReadyQueue {
    fn from_iter<I: IntoIterator<Item = &'a Task>>(iter: I) -> Self {
        let mut queue = Self::new();
        for task in iter {
            queue.push(task);
        }
        queue
    }
}
