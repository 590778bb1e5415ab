//! Marker workers draining the gray queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use crossbeam_utils::Backoff;
use dashmap::DashMap;

use crate::collector::Phase;
use crate::color::Color;
use crate::error::{GcError, GcResult};
use crate::events::{Actor, TraceEvent, TraceSink};
use crate::gray_queue::GrayQueue;
use crate::heap::{NodeId, ObjectHeap};

/// Shared marking engine: per-node promotion logic plus the concurrent
/// worker loop. One instance is shared by all marker threads and by the
/// driver's single-threaded re-mark drain.
pub struct Marker {
    heap: Arc<ObjectHeap>,
    queue: Arc<GrayQueue>,
    phase: Arc<ArcSwap<Phase>>,
    sink: Arc<dyn TraceSink>,
    /// Per-cycle dequeue accounting. Every enqueued node must be seen
    /// exactly once; a second sighting means the queue lock failed to
    /// serialize pops and the cycle is unsalvageable.
    dequeue_counts: DashMap<NodeId, usize>,
    nodes_marked: AtomicUsize,
    cas_losses: AtomicUsize,
}

impl Marker {
    pub fn new(
        heap: Arc<ObjectHeap>,
        queue: Arc<GrayQueue>,
        phase: Arc<ArcSwap<Phase>>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Marker {
            heap,
            queue,
            phase,
            sink,
            dequeue_counts: DashMap::new(),
            nodes_marked: AtomicUsize::new(0),
            cas_losses: AtomicUsize::new(0),
        }
    }

    /// Nodes successfully moved grey -> black this cycle.
    pub fn nodes_marked(&self) -> usize {
        self.nodes_marked.load(Ordering::Relaxed)
    }

    /// Benign CAS races lost this cycle (another actor advanced the color
    /// first).
    pub fn cas_losses(&self) -> usize {
        self.cas_losses.load(Ordering::Relaxed)
    }

    /// Dequeue count per node for the current cycle. Exactly 1 for every
    /// node that was enqueued, on any healthy run.
    pub fn visit_counts(&self) -> Vec<(NodeId, usize)> {
        self.dequeue_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Clear per-cycle accounting.
    pub(crate) fn reset(&self) {
        self.dequeue_counts.clear();
        self.nodes_marked.store(0, Ordering::Relaxed);
        self.cas_losses.store(0, Ordering::Relaxed);
    }

    /// Process one dequeued grey node: snapshot its children, promote every
    /// white child grey (enqueueing on CAS success), then blacken the node
    /// itself. A failed final CAS means another actor already advanced the
    /// color; under the forward-only rule that is safe to leave alone, so it
    /// is traced and not retried.
    pub fn process_node(&self, id: NodeId, actor: Actor) -> GcResult<()> {
        let visits = {
            let mut entry = self.dequeue_counts.entry(id).or_insert(0);
            *entry += 1;
            *entry
        };
        if visits > 1 {
            return Err(GcError::DoubleDequeue { node: id });
        }

        let node = self.heap.get(id);
        let phase = **self.phase.load();

        for child_id in node.children() {
            let child = self.heap.get(child_id);
            if child.color() == Color::White
                && child.transition_color(Color::White, Color::Grey)
            {
                self.queue.push(child_id);
                self.sink.emit(TraceEvent::ColorTransition {
                    node: child_id,
                    from: Color::White,
                    to: Color::Grey,
                    phase,
                    actor,
                });
            }
        }

        if node.transition_color(Color::Grey, Color::Black) {
            self.nodes_marked.fetch_add(1, Ordering::Relaxed);
            self.sink.emit(TraceEvent::ColorTransition {
                node: id,
                from: Color::Grey,
                to: Color::Black,
                phase,
                actor,
            });
        } else {
            self.cas_losses.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                target: "trimark",
                "{actor} lost grey->black race on {id} (now {})",
                node.color()
            );
        }

        Ok(())
    }

    /// Concurrent worker loop for one marker thread.
    ///
    /// The pop is non-blocking, so an empty observation alone is not an exit
    /// condition: the mutator may still be about to trigger a barrier push.
    /// The loop exits only once the queue is empty *and* the mutator has
    /// raised its done signal, or the cycle deadline has passed (the
    /// livelock bound). Between observations it backs off rather than
    /// spinning hot.
    pub fn run_worker(
        &self,
        worker: usize,
        mutators_done: &AtomicBool,
        deadline: Instant,
    ) -> GcResult<()> {
        let actor = Actor::Marker(worker);
        let backoff = Backoff::new();

        loop {
            match self.queue.pop() {
                Some(id) => {
                    self.process_node(id, actor)?;
                    backoff.reset();
                }
                None => {
                    // Order matters: the mutator pushes before it raises the
                    // flag, so done-then-still-empty proves quiescence.
                    if mutators_done.load(Ordering::Acquire) && self.queue.is_empty() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        log::warn!(
                            target: "trimark",
                            "marker-{worker} hit cycle deadline with mutator still active"
                        );
                        break;
                    }
                    backoff.snooze();
                }
            }
        }

        Ok(())
    }

    /// Single-threaded drain used by the driver during re-mark. Applies the
    /// same per-node promotion logic until the queue is exhausted; since the
    /// barrier is already disarmed and colors only move forward, this
    /// terminates regardless of how the concurrent phase ended.
    pub fn drain(&self, actor: Actor) -> GcResult<usize> {
        let mut processed = 0;
        while let Some(id) = self.queue.pop() {
            self.process_node(id, actor)?;
            processed += 1;
        }
        Ok(processed)
    }
}
