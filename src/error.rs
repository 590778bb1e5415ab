//! Error types for collection cycles.
//!
//! Benign CAS races never show up here: a failed color transition means a
//! competing actor already advanced the node and the loser just moves on.
//! What does surface is the corruption this design exists to prevent
//! (a hidden black-to-white edge) and fatal resource faults.

use thiserror::Error;

use crate::heap::NodeId;

/// Fatal conditions that abort a collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// A black node was found still holding a direct edge to a white node
    /// after re-mark, meaning a barrier call was missed. Continuing would
    /// produce a provably wrong partition.
    #[error("strong tri-color invariant violated: black {parent} references white {child}")]
    TricolorViolation { parent: NodeId, child: NodeId },

    /// The same node was handed to more than one worker, breaking the
    /// single-owner-per-pop guarantee of the gray queue.
    #[error("gray queue corruption: {node} dequeued more than once")]
    DoubleDequeue { node: NodeId },

    /// A marker worker died mid-cycle.
    #[error("marker worker {worker} panicked during concurrent mark")]
    MarkerPanicked { worker: usize },

    /// The simulated mutator died mid-cycle.
    #[error("mutator thread panicked during concurrent mark")]
    MutatorPanicked,
}

/// Result alias for collector operations.
pub type GcResult<T> = Result<T, GcError>;
