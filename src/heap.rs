//! Arena-backed object graph shared between the collector and the mutator.
//!
//! Nodes live in an arena addressed by stable integer index, so cyclic
//! graphs and shared children need no ownership gymnastics: edges are plain
//! index lists and the arena owns all storage.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::color::{AtomicColor, Color};

/// Stable handle to a node in an [`ObjectHeap`].
///
/// Handles are only minted by [`ObjectHeap::alloc`], so an id is always a
/// valid index into the arena that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A simulated heap object: an atomically-mutable tri-state color plus a
/// lock-protected list of outgoing edges.
///
/// The color is deliberately *not* behind the child-list mutex: the barrier,
/// the markers, and the driver all update it independently and must never
/// serialize on a single lock. Child mutation and the snapshot read share
/// one per-node mutex.
pub struct Node {
    id: NodeId,
    label: String,
    color: AtomicColor,
    children: Mutex<Vec<NodeId>>,
}

impl Node {
    fn new(id: NodeId, label: String) -> Self {
        Node {
            id,
            label,
            color: AtomicColor::new(Color::White),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Atomic load of the node's current color.
    pub fn color(&self) -> Color {
        self.color.load()
    }

    /// Unconditional color store; only used where no other actor can race
    /// (fresh nodes and the sweep-time reset).
    pub fn set_color(&self, color: Color) {
        self.color.store(color);
    }

    /// CAS the color from `old` to `new`. The sole mechanism for
    /// phase-critical transitions; `false` means another actor won the race.
    pub fn transition_color(&self, old: Color, new: Color) -> bool {
        self.color.compare_exchange(old, new)
    }

    /// Append an outgoing edge under the node's exclusive lock.
    pub fn add_child(&self, child: NodeId) {
        self.children.lock().push(child);
    }

    /// Locked snapshot copy of the child list. The lock is released before
    /// the caller traverses, so long-running marking never holds it.
    pub fn children(&self) -> Vec<NodeId> {
        self.children.lock().clone()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("color", &self.color())
            .field("children", &self.children())
            .finish()
    }
}

/// Arena owning every simulated object, reachable or not.
///
/// Allocation is concurrent: the mutator creates nodes while marking runs.
/// Sweep enumerates the full arena rather than chasing edges, which is how
/// orphaned objects get classified at all.
///
/// # Examples
///
/// ```
/// use trimark::heap::ObjectHeap;
///
/// let heap = ObjectHeap::new();
/// let cache = heap.alloc("cache");
/// let user = heap.alloc("user");
/// heap.add_child(cache, user);
///
/// assert_eq!(heap.len(), 2);
/// assert_eq!(heap.get(cache).children(), vec![user]);
/// ```
#[derive(Default)]
pub struct ObjectHeap {
    nodes: RwLock<Vec<Arc<Node>>>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        ObjectHeap::default()
    }

    /// Allocate a fresh white node and return its handle.
    pub fn alloc(&self, label: impl Into<String>) -> NodeId {
        let mut nodes = self.nodes.write();
        let id = NodeId(nodes.len() as u32);
        nodes.push(Arc::new(Node::new(id, label.into())));
        id
    }

    /// Fetch a node by handle. Handles come from [`alloc`](Self::alloc), so
    /// lookup cannot miss for ids minted by this heap.
    pub fn get(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.nodes.read()[id.index()])
    }

    /// Install an edge `parent -> child`. Mutators racing with marking must
    /// pair this with [`WriteBarrier::record_write`](crate::WriteBarrier::record_write).
    pub fn add_child(&self, parent: NodeId, child: NodeId) {
        self.get(parent).add_child(child);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Snapshot of every allocated node, in allocation order. Used by sweep
    /// and by the invariant scan; the read lock is dropped before traversal.
    pub fn snapshot(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    /// Handles of every allocated node, in allocation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.read().iter().map(|node| node.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn alloc_starts_white_with_stable_ids() {
        let heap = ObjectHeap::new();
        let a = heap.alloc("a");
        let b = heap.alloc("b");

        assert_ne!(a, b);
        assert_eq!(heap.get(a).color(), Color::White);
        assert_eq!(heap.get(a).label(), "a");
        assert_eq!(heap.node_ids(), vec![a, b]);
    }

    #[test]
    fn children_returns_a_snapshot_copy() {
        let heap = ObjectHeap::new();
        let parent = heap.alloc("parent");
        let first = heap.alloc("first");
        heap.add_child(parent, first);

        let snapshot = heap.get(parent).children();
        let second = heap.alloc("second");
        heap.add_child(parent, second);

        // The earlier snapshot is unaffected by the later mutation.
        assert_eq!(snapshot, vec![first]);
        assert_eq!(heap.get(parent).children(), vec![first, second]);
    }

    #[test]
    fn cyclic_edges_are_representable() {
        let heap = ObjectHeap::new();
        let a = heap.alloc("a");
        let b = heap.alloc("b");
        heap.add_child(a, b);
        heap.add_child(b, a);

        assert_eq!(heap.get(a).children(), vec![b]);
        assert_eq!(heap.get(b).children(), vec![a]);
    }

    #[test]
    fn concurrent_allocation_and_edge_installation() {
        let heap = Arc::new(ObjectHeap::new());
        let hub = heap.alloc("hub");

        thread::scope(|s| {
            for worker in 0..4 {
                let heap = Arc::clone(&heap);
                s.spawn(move || {
                    for i in 0..50 {
                        let child = heap.alloc(format!("w{worker}-{i}"));
                        heap.add_child(hub, child);
                    }
                });
            }
        });

        assert_eq!(heap.len(), 201);
        assert_eq!(heap.get(hub).children().len(), 200);
    }
}
