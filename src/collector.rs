//! Collection cycle driver: phase state machine, worker orchestration, and
//! the garbage/live partition.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::barrier::WriteBarrier;
use crate::color::Color;
use crate::error::{GcError, GcResult};
use crate::events::{Actor, NullSink, TraceEvent, TraceSink};
use crate::gray_queue::GrayQueue;
use crate::heap::{NodeId, ObjectHeap};
use crate::marker::Marker;
use crate::mutator::Mutator;

/// Collection cycle phases. Strictly linear within a cycle:
/// `InitialMark -> ConcurrentMark -> ReMark -> Sweep -> Done`, with `Idle`
/// as the resting state between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No cycle in progress.
    Idle,
    /// Stop-the-world: shade the roots grey and seed the queue.
    InitialMark,
    /// Markers and the mutator run in parallel; the barrier is armed.
    ConcurrentMark,
    /// Stop-the-world: drain barrier leftovers single-threaded.
    ReMark,
    /// Partition the full arena and reset survivors.
    Sweep,
    /// Cycle finished; the partition has been produced.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::InitialMark => write!(f, "initial-mark"),
            Phase::ConcurrentMark => write!(f, "concurrent-mark"),
            Phase::ReMark => write!(f, "re-mark"),
            Phase::Sweep => write!(f, "sweep"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Tunables for one collector instance.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Concurrent marker worker threads.
    pub markers: usize,
    /// Edges the simulated mutator installs during concurrent marking. Zero
    /// disables the mutator's writes (it still runs and signals).
    pub mutator_edges: usize,
    /// Upper bound on the concurrent-mark join. Prevents livelock should
    /// the mutator never finish its edge installation.
    pub deadline: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            markers: 2,
            mutator_edges: 1,
            deadline: Duration::from_secs(5),
        }
    }
}

/// Disjoint split of the full arena as observed at sweep time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Nodes that stayed white: unreachable, reported but not freed.
    pub garbage: Vec<NodeId>,
    /// Marked nodes, reset to white for the next cycle.
    pub live: Vec<NodeId>,
}

/// Counters for the most recent cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    /// Nodes the markers moved grey -> black.
    pub nodes_marked: usize,
    /// White children shaded grey by the write barrier.
    pub barrier_shades: usize,
    /// Nodes processed by the re-mark drain.
    pub remark_drained: usize,
    /// Benign color CAS races lost across all actors.
    pub cas_losses: usize,
    pub garbage_count: usize,
    pub live_count: usize,
    pub marking_time: Duration,
    pub sweep_time: Duration,
}

/// Orchestrates one tri-color mark-and-sweep cycle over an [`ObjectHeap`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trimark::{Collector, Color, ObjectHeap};
///
/// let heap = Arc::new(ObjectHeap::new());
/// let root = heap.alloc("root");
/// let leaf = heap.alloc("leaf");
/// heap.add_child(root, leaf);
/// let orphan = heap.alloc("orphan");
///
/// let collector = Collector::with_defaults(Arc::clone(&heap));
/// let partition = collector.run_collection_cycle(&[root]).unwrap();
///
/// assert_eq!(partition.garbage, vec![orphan]);
/// assert!(partition.live.contains(&root) && partition.live.contains(&leaf));
/// // Survivors are white again, ready for the next cycle.
/// assert_eq!(heap.get(root).color(), Color::White);
/// ```
pub struct Collector {
    heap: Arc<ObjectHeap>,
    queue: Arc<GrayQueue>,
    barrier: Arc<WriteBarrier>,
    marker: Arc<Marker>,
    sink: Arc<dyn TraceSink>,
    /// Lock-free phase reads for observers while a cycle runs.
    phase: Arc<ArcSwap<Phase>>,
    stats: ArcSwap<CycleStats>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(
        heap: Arc<ObjectHeap>,
        config: CollectorConfig,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        let queue = Arc::new(GrayQueue::new());
        let phase = Arc::new(ArcSwap::new(Arc::new(Phase::Idle)));
        let barrier = Arc::new(WriteBarrier::new(
            Arc::clone(&heap),
            Arc::clone(&queue),
            Arc::clone(&phase),
            Arc::clone(&sink),
        ));
        let marker = Arc::new(Marker::new(
            Arc::clone(&heap),
            Arc::clone(&queue),
            Arc::clone(&phase),
            Arc::clone(&sink),
        ));

        Collector {
            heap,
            queue,
            barrier,
            marker,
            sink,
            phase,
            stats: ArcSwap::new(Arc::new(CycleStats::default())),
            config,
        }
    }

    /// Collector with default configuration and no tracing.
    pub fn with_defaults(heap: Arc<ObjectHeap>) -> Self {
        Collector::new(heap, CollectorConfig::default(), Arc::new(NullSink))
    }

    pub fn heap(&self) -> &Arc<ObjectHeap> {
        &self.heap
    }

    pub fn barrier(&self) -> &Arc<WriteBarrier> {
        &self.barrier
    }

    /// Marking engine; exposes per-cycle dequeue accounting.
    pub fn marker(&self) -> &Arc<Marker> {
        &self.marker
    }

    pub fn current_phase(&self) -> Phase {
        **self.phase.load()
    }

    /// Counters from the most recent completed cycle.
    pub fn stats(&self) -> CycleStats {
        (**self.stats.load()).clone()
    }

    fn set_phase(&self, next: Phase) {
        let prev = **self.phase.load();
        self.phase.store(Arc::new(next));
        self.sink.emit(TraceEvent::PhaseChange {
            from: prev,
            to: next,
        });
    }

    /// Run one full collection cycle, synchronously: blocks the caller until
    /// sweep completes and returns the garbage/live partition of the entire
    /// allocated set, or the invariant violation that aborted the cycle.
    pub fn run_collection_cycle(&self, roots: &[NodeId]) -> GcResult<Partition> {
        self.marker.reset();
        self.barrier.reset();
        self.queue.clear();

        let mark_start = Instant::now();

        // Initial mark (stop-the-world): seed the queue from the roots.
        self.set_phase(Phase::InitialMark);
        for &root in roots {
            let node = self.heap.get(root);
            if node.color() == Color::White
                && node.transition_color(Color::White, Color::Grey)
            {
                self.queue.push(root);
                self.sink.emit(TraceEvent::ColorTransition {
                    node: root,
                    from: Color::White,
                    to: Color::Grey,
                    phase: Phase::InitialMark,
                    actor: Actor::Driver,
                });
            }
        }

        // Concurrent mark: markers and the mutator on real OS threads.
        self.set_phase(Phase::ConcurrentMark);
        self.barrier.activate();

        let deadline = Instant::now() + self.config.deadline;
        let workers = self.config.markers.max(1);
        let mutator_done = AtomicBool::new(false);
        let (start_tx, start_rx) = flume::bounded(1);
        let mutator = Mutator::new(
            Arc::clone(&self.heap),
            Arc::clone(&self.barrier),
            self.config.mutator_edges,
        );

        let concurrent = thread::scope(|s| {
            let done = &mutator_done;

            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let marker = Arc::clone(&self.marker);
                    s.spawn(move || marker.run_worker(worker, done, deadline))
                })
                .collect();
            let mutator_handle = s.spawn(move || mutator.run(start_rx, done, deadline));
            // Markers are live; release the mutator through the start gate.
            let _ = start_tx.send(());

            let mut result: GcResult<()> = Ok(());
            for (worker, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(worker_result) => {
                        if result.is_ok() {
                            result = worker_result;
                        }
                    }
                    Err(_) => result = Err(GcError::MarkerPanicked { worker }),
                }
            }
            if mutator_handle.join().is_err() && result.is_ok() {
                result = Err(GcError::MutatorPanicked);
            }
            result
        });

        self.barrier.deactivate();
        concurrent?;

        // Re-mark (stop-the-world): drain whatever the barrier enqueued in
        // the race window around the markers' exit.
        self.set_phase(Phase::ReMark);
        let remark_drained = self.marker.drain(Actor::Driver)?;

        // The partition below is only meaningful if no black node still
        // points at a white one; a hit here means a barrier call was missed.
        self.verify_tricolor_invariant()?;
        let marking_time = mark_start.elapsed();

        // Sweep: classify the full arena, orphans included.
        self.set_phase(Phase::Sweep);
        let sweep_start = Instant::now();
        let mut garbage = Vec::new();
        let mut live = Vec::new();
        for node in self.heap.snapshot() {
            let color = node.color();
            if color == Color::White {
                garbage.push(node.id());
            } else {
                live.push(node.id());
                node.set_color(Color::White);
                self.sink.emit(TraceEvent::ColorTransition {
                    node: node.id(),
                    from: color,
                    to: Color::White,
                    phase: Phase::Sweep,
                    actor: Actor::Driver,
                });
            }
        }
        let sweep_time = sweep_start.elapsed();

        self.set_phase(Phase::Done);
        self.stats.store(Arc::new(CycleStats {
            nodes_marked: self.marker.nodes_marked(),
            barrier_shades: self.barrier.shade_count(),
            remark_drained,
            cas_losses: self.marker.cas_losses(),
            garbage_count: garbage.len(),
            live_count: live.len(),
            marking_time,
            sweep_time,
        }));
        self.sink.emit(TraceEvent::CycleComplete {
            garbage: garbage.len(),
            live: live.len(),
        });

        Ok(Partition { garbage, live })
    }

    /// Full-heap scan for black-to-white edges after re-mark.
    fn verify_tricolor_invariant(&self) -> GcResult<()> {
        for node in self.heap.snapshot() {
            if node.color() != Color::Black {
                continue;
            }
            for child_id in node.children() {
                if self.heap.get(child_id).color() == Color::White {
                    return Err(GcError::TricolorViolation {
                        parent: node.id(),
                        child: child_id,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_collector(heap: &Arc<ObjectHeap>, markers: usize, mutator_edges: usize) -> Collector {
        Collector::new(
            Arc::clone(heap),
            CollectorConfig {
                markers,
                mutator_edges,
                deadline: Duration::from_secs(5),
            },
            Arc::new(NullSink),
        )
    }

    #[test]
    fn phases_are_displayed_in_kebab_case() {
        assert_eq!(Phase::InitialMark.to_string(), "initial-mark");
        assert_eq!(Phase::ConcurrentMark.to_string(), "concurrent-mark");
        assert_eq!(Phase::ReMark.to_string(), "re-mark");
    }

    #[test]
    fn empty_heap_partitions_into_nothing() {
        let heap = Arc::new(ObjectHeap::new());
        let collector = quiet_collector(&heap, 1, 0);

        let partition = collector.run_collection_cycle(&[]).unwrap();

        assert!(partition.garbage.is_empty());
        assert!(partition.live.is_empty());
        assert_eq!(collector.current_phase(), Phase::Done);
    }

    #[test]
    fn already_marked_root_is_not_reseeded() {
        let heap = Arc::new(ObjectHeap::new());
        let root = heap.alloc("root");
        heap.get(root).set_color(Color::Grey);
        let collector = quiet_collector(&heap, 1, 0);

        // Grey root: the initial-mark CAS is skipped, but the node is still
        // on nobody's queue, so re-mark never sees it; sweep classifies by
        // color alone and the node survives.
        let partition = collector.run_collection_cycle(&[root]).unwrap();
        assert_eq!(partition.live, vec![root]);
    }

    #[test]
    fn invariant_violation_aborts_with_offending_edge() {
        let heap = Arc::new(ObjectHeap::new());
        let parent = heap.alloc("parent");
        let child = heap.alloc("child");

        let collector = quiet_collector(&heap, 1, 0);
        // Forge the exact corruption the barrier exists to prevent: a black
        // parent holding the only reference to a white child, with no
        // barrier call recorded.
        heap.get(parent).set_color(Color::Black);
        heap.add_child(parent, child);

        let error = collector.run_collection_cycle(&[]).unwrap_err();
        assert_eq!(error, GcError::TricolorViolation { parent, child });
    }

    #[test]
    fn stats_reflect_the_last_cycle() {
        let heap = Arc::new(ObjectHeap::new());
        let root = heap.alloc("root");
        let leaf = heap.alloc("leaf");
        heap.add_child(root, leaf);
        heap.alloc("orphan");

        let collector = quiet_collector(&heap, 2, 0);
        collector.run_collection_cycle(&[root]).unwrap();

        let stats = collector.stats();
        assert_eq!(stats.nodes_marked, 2);
        assert_eq!(stats.live_count, 2);
        assert_eq!(stats.garbage_count, 1);
        assert_eq!(stats.barrier_shades, 0);
    }
}
