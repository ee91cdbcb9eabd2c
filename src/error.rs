//! Error model for the triangulation kernel.
//!
//! `spec.md` §7 names three failure kinds that client code (the physics
//! layer) needs to match on programmatically, which is why this crate uses a
//! `thiserror`-derived enum rather than the teacher crate's `anyhow::Error`
//! strings: callers of a simulation kernel routinely retry on
//! `PositionNotAllowed` but must not swallow `InvariantViolated`.

use crate::types::{EdgeId, NodeId, Vertex3};
use thiserror::Error;

/// Failure modes the kernel can report to its caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// A coordinate equals an existing node's position (duplicate point), or
    /// a motion would place a node exactly on an existing node.
    ///
    /// Raised from the position check performed during walks and
    /// insertions. The operation leaves the triangulation state unchanged;
    /// [`crate::triangulation::Triangulation::move_node`]'s slow path also
    /// reverts the node's position before returning this.
    #[error("position {position:?} coincides with an existing node")]
    PositionNotAllowed { position: Vertex3 },

    /// A Delaunay restoration pass terminated with messed-up tetrahedra
    /// remaining after `clean_up` exhausted its iteration budget.
    ///
    /// This is the kernel's contract being violated and indicates a bug;
    /// production code should log it and keep operating on the
    /// best-effort triangulation that remains, since a partially completed
    /// mutation leaves invariants 1–6 in an unspecified state (see
    /// `spec.md` §5).
    #[error("Delaunay restoration could not resolve all violations: {detail}")]
    InvariantViolated { detail: String },

    /// `Edge::opposite(node)` was called with a node that is not one of the
    /// edge's two endpoints. A programming error, surfaced to the caller.
    #[error("node {node} is not incident to edge {edge}")]
    EdgeNotIncident { edge: EdgeId, node: NodeId },

    /// An operation that requires a seeded triangulation (at least one
    /// tetrahedron) was called before [`crate::triangulation::Triangulation::insert_first_node`].
    #[error("triangulation has not been seeded with an initial tetrahedron")]
    EmptyTriangulation,

    /// `insert_first_node`'s four seed points (or the four points handed to
    /// any other initial-tetrahedron constructor) are exactly coplanar.
    #[error("the four seed points are coplanar and cannot form a tetrahedron")]
    DegenerateSeed,
}

/// Convenience alias for kernel results.
pub type Result<T> = core::result::Result<T, KernelError>;
