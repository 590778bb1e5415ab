//! Concurrent tri-color mark-and-sweep collection, simulated.
//!
//! The crate models the core mechanism real runtime collectors use to find
//! reachable objects while mutator code keeps running: an arena-backed
//! object graph, a shared gray work queue, parallel marker workers, a
//! Dijkstra-style write barrier, and a linear phase driver producing a
//! garbage/live partition. Nothing is actually freed; the partition is the
//! product.
//!
//! ```
//! use std::sync::Arc;
//! use trimark::{Collector, ObjectHeap};
//!
//! let heap = Arc::new(ObjectHeap::new());
//! let service = heap.alloc("service");
//! let cache = heap.alloc("cache");
//! heap.add_child(service, cache);
//! let stale = heap.alloc("stale-session");
//!
//! let collector = Collector::with_defaults(Arc::clone(&heap));
//! let partition = collector.run_collection_cycle(&[service]).unwrap();
//! assert!(partition.garbage.contains(&stale));
//! assert!(partition.live.contains(&cache));
//! ```

pub mod barrier;
pub mod collector;
pub mod color;
pub mod error;
pub mod events;
pub mod gray_queue;
pub mod heap;
pub mod marker;
pub mod mutator;

pub use barrier::WriteBarrier;
pub use collector::{Collector, CollectorConfig, CycleStats, Partition, Phase};
pub use color::{AtomicColor, Color};
pub use error::{GcError, GcResult};
pub use events::{
    Actor, ChannelSink, FanoutSink, LogSink, MemorySink, NullSink, TraceEvent, TraceSink,
};
pub use gray_queue::GrayQueue;
pub use heap::{Node, NodeId, ObjectHeap};
pub use marker::Marker;
pub use mutator::Mutator;
