//! # forest-amr
//!
//! forest-amr is the topology engine of a distributed, adaptively refined
//! forest of octrees (quadtrees in 2D) for parallel mesh computations.
//! Octants are addressed by integer coordinates and refinement level under
//! a Morton (z-order) encoding; the forest is sharded across cooperating
//! processes, each owning a contiguous range of the global Morton order.
//!
//! ## Features
//! - Allocation-free octant codec: Morton ids, ancestry, face/edge/corner
//!   neighbor construction by bit manipulation
//! - Bulk, collective forest transitions: refine, coarsen, 2:1 balance,
//!   weighted partition with family snapping, deep copy
//! - Ghost layers with mirror bookkeeping and 1-based host report views
//! - Flat adjacency extraction (faces, corners, and the non-conforming 3D
//!   edge tables with hanging half-edge records)
//! - Migration control data describing octant movement on repartition
//! - Pluggable communication backends: serial, in-process multi-rank, and
//!   MPI behind the `mpi-support` feature
//!
//! ## Determinism
//!
//! Every collective operation is synchronous and order-deterministic:
//! running the same transitions on the same inputs produces byte-identical
//! structures on every rank, regardless of hash-map iteration or message
//! arrival order.

pub mod comm;
pub mod context;
pub mod error;
pub mod forest;
pub mod geometry;
pub mod ghost;
pub mod mesh;
pub mod migrate;
pub mod octant;

/// A convenient prelude importing the most-used types.
pub mod prelude {
    pub use crate::comm::{Communicator, LocalCluster, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::mpi::MpiComm;
    pub use crate::context::ForestContext;
    pub use crate::error::ForestError;
    pub use crate::forest::partition::PartitionOptions;
    pub use crate::forest::reconcile::reconcile_flags;
    pub use crate::forest::Forest;
    pub use crate::geometry::BoundingBox;
    pub use crate::ghost::{CellImport, GhostLayer};
    pub use crate::mesh::{MeshConnectivity, NO_NEIGHBOR};
    pub use crate::migrate::MigrationPlan;
    pub use crate::octant::{Connectivity, Octant, Octant3, Quadrant, RefineFlag};
}
