//! `SpaceNode`: a point in ℝ³ carrying its incident edges and tetrahedra.
//!
//! `spec.md` §3 describes `SpaceNode` as the entry point for
//! insert/move/remove and as the owner of the incident-edge list. This
//! crate keeps that ownership but moves the mutating *operations* onto
//! [`crate::triangulation::Triangulation`] (the session), which is the
//! idiomatic Rust shape for a graph whose nodes reference shared,
//! arena-owned state: a `NodeId` is a `Copy` handle, and all mutation goes
//! through the one type that holds the arenas, mirroring how the teacher
//! crate routes every mutation through `TetDataStructure`/`Tetrahedralization`
//! rather than through index types directly.

pub use crate::types::NodeId;
use crate::types::{EdgeId, TetId, Vertex3};

/// The data owned by a node. Opaque to callers; reached only through
/// [`crate::triangulation::Triangulation`] accessors.
#[derive(Debug, Clone)]
pub(crate) struct NodeData<U> {
    pub(crate) position: Vertex3,
    pub(crate) user_object: U,
    pub(crate) incident_edges: Vec<EdgeId>,
    pub(crate) incident_tets: Vec<TetId>,
    /// Accumulated dual-cell volume, consumed by the physics layer and
    /// otherwise opaque to the kernel (`spec.md` §3).
    pub(crate) dual_volume: f64,
}

impl<U> NodeData<U> {
    pub(crate) fn new(position: Vertex3, user_object: U) -> Self {
        Self {
            position,
            user_object,
            incident_edges: Vec::new(),
            incident_tets: Vec::new(),
            dual_volume: 0.0,
        }
    }

    pub(crate) fn add_incident_tet(&mut self, tet: TetId) {
        if !self.incident_tets.contains(&tet) {
            self.incident_tets.push(tet);
        }
    }

    pub(crate) fn remove_incident_tet(&mut self, tet: TetId) {
        self.incident_tets.retain(|&t| t != tet);
    }

    pub(crate) fn add_incident_edge(&mut self, edge: EdgeId) {
        if !self.incident_edges.contains(&edge) {
            self.incident_edges.push(edge);
        }
    }

    pub(crate) fn remove_incident_edge(&mut self, edge: EdgeId) {
        self.incident_edges.retain(|&e| e != edge);
    }
}
