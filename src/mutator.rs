//! Simulated mutator installing edges while marking runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_utils::Backoff;

use crate::barrier::WriteBarrier;
use crate::color::Color;
use crate::heap::{NodeId, ObjectHeap};

/// Concurrent actor standing in for application code.
///
/// During concurrent marking it repeatedly picks an already-black node,
/// allocates a fresh white node, and installs the edge through the write
/// barrier: exactly the access pattern that would hide a live object from
/// the marker if the barrier were missing.
///
/// Sequencing with the markers uses explicit signals, never delays: a flume
/// start gate from the driver on the way in, an atomic done flag on the way
/// out. Waiting for a black node to appear is bounded by the cycle deadline
/// so a root-less graph cannot livelock the cycle.
pub struct Mutator {
    heap: Arc<ObjectHeap>,
    barrier: Arc<WriteBarrier>,
    /// Number of new edges to install during the cycle.
    edges: usize,
}

impl Mutator {
    pub fn new(heap: Arc<ObjectHeap>, barrier: Arc<WriteBarrier>, edges: usize) -> Self {
        Mutator {
            heap,
            barrier,
            edges,
        }
    }

    /// Body of the mutator thread for one cycle. Installed node handles are
    /// returned for inspection; `done` is raised on every exit path so the
    /// markers' termination condition always becomes true.
    pub fn run(
        &self,
        start: flume::Receiver<()>,
        done: &AtomicBool,
        deadline: Instant,
    ) -> Vec<NodeId> {
        let mut installed = Vec::with_capacity(self.edges);

        if start.recv_deadline(deadline).is_ok() {
            for i in 0..self.edges {
                let Some(parent) = self.wait_for_black(deadline) else {
                    break;
                };
                let child = self.heap.alloc(format!("mutator-{i}"));
                // Barrier first, then the store, matching the contract that
                // the hook runs at the moment the reference is installed.
                self.barrier.record_write(parent, child);
                self.heap.add_child(parent, child);
                installed.push(child);
            }
        }

        done.store(true, Ordering::Release);
        installed
    }

    /// Poll for any black node, backing off between scans, until the
    /// deadline expires.
    fn wait_for_black(&self, deadline: Instant) -> Option<NodeId> {
        let backoff = Backoff::new();
        loop {
            if let Some(id) = self.find_black() {
                return Some(id);
            }
            if Instant::now() >= deadline {
                log::warn!(target: "trimark", "mutator found no black node before deadline");
                return None;
            }
            backoff.snooze();
        }
    }

    fn find_black(&self) -> Option<NodeId> {
        self.heap
            .snapshot()
            .into_iter()
            .find(|node| node.color() == Color::Black)
            .map(|node| node.id())
    }
}
