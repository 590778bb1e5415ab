//! Property-based tests for the fundamental collection invariants:
//! soundness (reachable implies live), completeness (unreachable implies
//! garbage), and reset idempotence, explored over randomized graphs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use trimark::{Collector, CollectorConfig, Color, NodeId, NullSink, ObjectHeap};

/// Build an arena graph of `node_count` nodes with `edge_count` random
/// edges (self-edges and duplicates allowed; both are legal graphs).
fn build_graph(node_count: usize, edge_count: usize, seed: u64) -> (Arc<ObjectHeap>, Vec<NodeId>) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let heap = Arc::new(ObjectHeap::new());
    let ids: Vec<NodeId> = (0..node_count).map(|i| heap.alloc(format!("n{i}"))).collect();

    for _ in 0..edge_count {
        let from = ids[rng.usize(..ids.len())];
        let to = ids[rng.usize(..ids.len())];
        heap.add_child(from, to);
    }

    (heap, ids)
}

/// Reference reachability: iterative BFS over child snapshots.
fn reachable_from(heap: &ObjectHeap, roots: &[NodeId]) -> HashSet<NodeId> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut frontier: Vec<NodeId> = roots.to_vec();

    while let Some(id) = frontier.pop() {
        if seen.insert(id) {
            frontier.extend(heap.get(id).children());
        }
    }

    seen
}

fn collector(heap: &Arc<ObjectHeap>, markers: usize) -> Collector {
    Collector::new(
        Arc::clone(heap),
        CollectorConfig {
            markers,
            mutator_edges: 0,
            deadline: Duration::from_secs(5),
        },
        Arc::new(NullSink),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// The partition equals exactly the reachability split: every root-
    /// reachable node is live, every other node is garbage, and the two
    /// sets cover the arena disjointly.
    #[test]
    fn partition_matches_reachability(
        node_count in 2usize..60,
        edge_factor in 0usize..4,
        root_count in 1usize..6,
        markers in 1usize..5,
        seed in any::<u64>(),
    ) {
        let edge_count = node_count * edge_factor;
        let (heap, ids) = build_graph(node_count, edge_count, seed);
        let roots: Vec<NodeId> = ids.iter().take(root_count.min(ids.len())).copied().collect();

        let expected_live = reachable_from(&heap, &roots);

        let collector = collector(&heap, markers);
        let partition = collector.run_collection_cycle(&roots).unwrap();

        let live: HashSet<NodeId> = partition.live.iter().copied().collect();
        let garbage: HashSet<NodeId> = partition.garbage.iter().copied().collect();

        prop_assert_eq!(&live, &expected_live);
        prop_assert_eq!(live.len() + garbage.len(), heap.len());
        prop_assert!(live.is_disjoint(&garbage));

        // Reset invariant: survivors are white again.
        for id in &live {
            prop_assert_eq!(heap.get(*id).color(), Color::White);
        }
    }

    /// Running the same cycle again on the untouched graph reproduces the
    /// partition, and every enqueued node was dequeued exactly once.
    #[test]
    fn cycles_are_repeatable_and_single_visit(
        node_count in 2usize..40,
        edge_factor in 0usize..3,
        markers in 1usize..4,
        seed in any::<u64>(),
    ) {
        let (heap, ids) = build_graph(node_count, node_count * edge_factor, seed);
        let roots = vec![ids[0]];

        let collector = collector(&heap, markers);
        let mut first = collector.run_collection_cycle(&roots).unwrap();
        for (node, visits) in collector.marker().visit_counts() {
            prop_assert_eq!(visits, 1, "{} dequeued {} times", node, visits);
        }

        let mut second = collector.run_collection_cycle(&roots).unwrap();
        first.garbage.sort();
        first.live.sort();
        second.garbage.sort();
        second.live.sort();
        prop_assert_eq!(first, second);
    }
}
