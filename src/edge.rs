//! `Edge`: an undirected pair of nodes (`spec.md` §3 C4).

pub use crate::types::EdgeId;
use crate::error::KernelError;
use crate::types::{NodeId, TetId};

/// The data owned by an edge. Created on demand by a tetrahedron's
/// initialization and destroyed when its last incident tetrahedron is
/// removed (`spec.md` §3).
#[derive(Debug, Clone)]
pub(crate) struct EdgeData {
    pub(crate) nodes: [NodeId; 2],
    pub(crate) incident_tets: Vec<TetId>,
    /// Sum of the per-tetrahedron contributions (`spec.md` §4.1, §8 P4).
    pub(crate) cross_section_area: f64,
}

impl EdgeData {
    pub(crate) fn new(a: NodeId, b: NodeId) -> Self {
        Self {
            nodes: [a, b],
            incident_tets: Vec::new(),
            cross_section_area: 0.0,
        }
    }

    /// The unordered key identifying this edge, invariant under endpoint
    /// order (`spec.md` §3 identity).
    pub(crate) fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a.index() <= b.index() { (a, b) } else { (b, a) }
    }

    pub(crate) fn opposite(&self, self_id: EdgeId, node: NodeId) -> Result<NodeId, KernelError> {
        if self.nodes[0] == node {
            Ok(self.nodes[1])
        } else if self.nodes[1] == node {
            Ok(self.nodes[0])
        } else {
            Err(KernelError::EdgeNotIncident { edge: self_id, node })
        }
    }

    pub(crate) fn add_incident_tet(&mut self, tet: TetId) {
        debug_assert!(!self.incident_tets.contains(&tet));
        self.incident_tets.push(tet);
    }

    pub(crate) fn remove_incident_tet(&mut self, tet: TetId) {
        self.incident_tets.retain(|&t| t != tet);
    }

    pub(crate) const fn is_orphaned(&self) -> bool {
        self.incident_tets.is_empty()
    }
}
