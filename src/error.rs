//! Unified error type for forest-amr public APIs.
//!
//! Every fallible operation in this crate returns `Result<_, ForestError>`.
//! Absence of an octant (binary search misses, neighbors beyond the domain
//! boundary) is *not* an error; those paths return `Option`/sentinels.

use thiserror::Error;

/// Unified error type for forest operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForestError {
    /// The context was asked to manage more than the single supported tree.
    #[error("forest supports exactly one root tree, got {0}")]
    MultipleTrees(usize),
    /// Ghost/balance connectivity selector outside the supported range.
    #[error("connectivity selector {got} out of range for dimension {dim}")]
    InvalidConnectivity { got: usize, dim: usize },
    /// A flag replay slice did not match the local octant count.
    #[error("flag slice length {got} does not match local octant count {expected}")]
    FlagLengthMismatch { got: usize, expected: usize },
    /// Two forest snapshots are not related by a single refine/coarsen step.
    #[error("forest snapshots are not related by one refine/coarsen step (old index {old_index})")]
    InconsistentSnapshots { old_index: usize },
    /// Two forest snapshots disagree on the process group shape.
    #[error("forest snapshots belong to different process groups ({0} vs {1} ranks)")]
    ProcessGroupMismatch(usize, usize),
    /// A face neighbor required by extraction was neither local nor ghost.
    ///
    /// Indicates an unbalanced forest or a ghost layer built with a weaker
    /// connectivity pattern than extraction needs.
    #[error("neighbor of local octant {local_index} across face {face} not found; forest unbalanced or ghost pattern too weak")]
    NeighborNotFound { local_index: usize, face: usize },
}
