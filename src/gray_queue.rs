//! Shared FIFO work list of pending grey nodes.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::heap::NodeId;

/// The gray queue: nodes discovered but not yet scanned.
///
/// Pushes come from the initial root scan, from markers re-enqueueing
/// children, and from the write barrier; pops come from marker workers. One
/// queue-level lock serializes both sides, which is what guarantees a node
/// is dequeued by exactly one worker. FIFO holds among successful enqueues;
/// no ordering is promised between barrier pushes and marker pushes.
#[derive(Default)]
pub struct GrayQueue {
    inner: Mutex<VecDeque<NodeId>>,
}

impl GrayQueue {
    pub fn new() -> Self {
        GrayQueue::default()
    }

    pub fn push(&self, id: NodeId) {
        self.inner.lock().push_back(id);
    }

    /// Non-blocking pop. Markers observing `None` decide between backing off
    /// and exiting; the queue itself never parks a caller.
    pub fn pop(&self) -> Option<NodeId> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Discard any pending entries. Used by the driver when starting a cycle
    /// after an aborted one.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
