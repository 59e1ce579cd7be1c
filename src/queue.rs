//! WorkQueue: a bounded, drain-once FIFO of `WorkItem`.
//!
//! Unlike a reusable-resource pool, items are never returned once taken —
//! each `WorkItem` is consumed exactly once and the queue is closed after
//! construction.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::model::WorkItem;

/// Insertion order is preserved internally but is not an observable
/// contract — callers must not rely on `take()` order for correctness.
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    /// Builds a queue already populated with `items`. The queue is closed
    /// after construction; there is no `push` once a run has started.
    pub fn new(items: Vec<WorkItem>) -> Self {
        WorkQueue {
            items: Mutex::new(items.into()),
        }
    }

    /// Pulls the next item, or `None` once the queue is drained.
    pub fn take(&self) -> Option<WorkItem> {
        self.items.lock().expect("queue mutex poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
