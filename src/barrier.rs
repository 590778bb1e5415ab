//! Dijkstra-style write barrier preserving the strong tri-color invariant.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::collector::Phase;
use crate::color::Color;
use crate::events::{Actor, TraceEvent, TraceSink};
use crate::gray_queue::GrayQueue;
use crate::heap::{NodeId, ObjectHeap};

/// Mutator-side hook invoked at the moment an edge is installed.
///
/// A black parent has already been scanned; if the mutator hands it a white
/// child, nothing will ever revisit the parent and the child would be swept
/// as garbage despite being live. The barrier closes that hole: it shades
/// the white child grey and re-enqueues it. The shade is CAS-guarded, so a
/// race with a marker promoting the same node resolves to exactly one
/// enqueue.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trimark::{Collector, Color, ObjectHeap};
///
/// let heap = Arc::new(ObjectHeap::new());
/// let parent = heap.alloc("parent");
/// let child = heap.alloc("child");
///
/// let collector = Collector::with_defaults(Arc::clone(&heap));
/// let barrier = collector.barrier();
///
/// // Outside concurrent marking the barrier is a no-op.
/// barrier.record_write(parent, child);
/// assert_eq!(heap.get(child).color(), Color::White);
/// ```
pub struct WriteBarrier {
    heap: Arc<ObjectHeap>,
    queue: Arc<GrayQueue>,
    /// Set only for the duration of concurrent marking.
    active: AtomicBool,
    shade_count: AtomicUsize,
    phase: Arc<ArcSwap<Phase>>,
    sink: Arc<dyn TraceSink>,
}

impl WriteBarrier {
    pub fn new(
        heap: Arc<ObjectHeap>,
        queue: Arc<GrayQueue>,
        phase: Arc<ArcSwap<Phase>>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        WriteBarrier {
            heap,
            queue,
            active: AtomicBool::new(false),
            shade_count: AtomicUsize::new(0),
            phase,
            sink,
        }
    }

    /// Arm the barrier for concurrent marking.
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Disarm after marking completes.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of white children shaded grey by this barrier in the current
    /// cycle.
    pub fn shade_count(&self) -> usize {
        self.shade_count.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.shade_count.store(0, Ordering::Relaxed);
    }

    /// Record the installation of an edge `parent -> child`.
    ///
    /// Called synchronously by the mutator alongside the actual
    /// [`add_child`](ObjectHeap::add_child). Relaxed loads of both colors
    /// are sufficient: the barrier only reacts to the black-parent /
    /// white-child combination, and the reaction itself is CAS-guarded, so
    /// a simultaneous promotion by a marker cannot double-enqueue the child.
    /// Every other color combination is a no-op.
    pub fn record_write(&self, parent: NodeId, child: NodeId) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }

        let parent_node = self.heap.get(parent);
        let child_node = self.heap.get(child);

        if parent_node.color() == Color::Black && child_node.color() == Color::White {
            if child_node.transition_color(Color::White, Color::Grey) {
                self.queue.push(child);
                self.shade_count.fetch_add(1, Ordering::Relaxed);
                let phase = **self.phase.load();
                self.sink.emit(TraceEvent::BarrierShade { parent, child });
                self.sink.emit(TraceEvent::ColorTransition {
                    node: child,
                    from: Color::White,
                    to: Color::Grey,
                    phase,
                    actor: Actor::Mutator,
                });
            } else {
                // A marker promoted the child first; exactly one side wins.
                log::trace!(target: "trimark", "barrier lost shade race on {child}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    fn barrier_fixture() -> (Arc<ObjectHeap>, Arc<GrayQueue>, Arc<MemorySink>, WriteBarrier) {
        let heap = Arc::new(ObjectHeap::new());
        let queue = Arc::new(GrayQueue::new());
        let sink = Arc::new(MemorySink::new());
        let phase = Arc::new(ArcSwap::new(Arc::new(Phase::ConcurrentMark)));
        let barrier = WriteBarrier::new(
            Arc::clone(&heap),
            Arc::clone(&queue),
            phase,
            Arc::clone(&sink) as Arc<dyn TraceSink>,
        );
        (heap, queue, sink, barrier)
    }

    #[test]
    fn inactive_barrier_is_a_no_op() {
        let (heap, queue, _sink, barrier) = barrier_fixture();
        let parent = heap.alloc("parent");
        let child = heap.alloc("child");
        heap.get(parent).set_color(Color::Black);

        barrier.record_write(parent, child);

        assert_eq!(heap.get(child).color(), Color::White);
        assert!(queue.is_empty());
    }

    #[test]
    fn shades_white_child_of_black_parent() {
        let (heap, queue, sink, barrier) = barrier_fixture();
        let parent = heap.alloc("parent");
        let child = heap.alloc("child");
        heap.get(parent).set_color(Color::Black);
        barrier.activate();

        barrier.record_write(parent, child);

        assert_eq!(heap.get(child).color(), Color::Grey);
        assert_eq!(queue.pop(), Some(child));
        assert_eq!(barrier.shade_count(), 1);

        let events = sink.take();
        assert!(events
            .iter()
            .any(|event| matches!(event, TraceEvent::BarrierShade { .. })));
    }

    #[test]
    fn other_color_combinations_are_ignored() {
        let (heap, queue, _sink, barrier) = barrier_fixture();
        barrier.activate();

        let white_parent = heap.alloc("white-parent");
        let grey_parent = heap.alloc("grey-parent");
        let black_parent = heap.alloc("black-parent");
        let white_child = heap.alloc("white-child");
        let grey_child = heap.alloc("grey-child");

        heap.get(grey_parent).set_color(Color::Grey);
        heap.get(black_parent).set_color(Color::Black);
        heap.get(grey_child).set_color(Color::Grey);

        barrier.record_write(white_parent, white_child);
        barrier.record_write(grey_parent, white_child);
        barrier.record_write(black_parent, grey_child);

        assert_eq!(heap.get(white_child).color(), Color::White);
        assert_eq!(heap.get(grey_child).color(), Color::Grey);
        assert!(queue.is_empty());
        assert_eq!(barrier.shade_count(), 0);
    }

    #[test]
    fn repeated_writes_enqueue_the_child_once() {
        let (heap, queue, _sink, barrier) = barrier_fixture();
        let parent = heap.alloc("parent");
        let child = heap.alloc("child");
        heap.get(parent).set_color(Color::Black);
        barrier.activate();

        barrier.record_write(parent, child);
        barrier.record_write(parent, child);

        assert_eq!(queue.len(), 1);
        assert_eq!(barrier.shade_count(), 1);
    }
}
