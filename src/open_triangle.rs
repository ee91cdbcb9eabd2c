//! Open-Triangle Organizer: currently-unpaired triangles during cavity
//! repair (`spec.md` §3 C3, §4.6).

use crate::types::{GraphVertex, TriangleId};
use std::collections::HashMap;

/// A set of triangles with exactly one incident tetrahedron, keyed by the
/// unordered triple of graph vertices (a hash invariant under vertex
/// permutation, `spec.md` §4.6). Hull-side triangles key in just as
/// interior ones do, since [`GraphVertex`] unifies real nodes and the
/// conceptual point at infinity.
///
/// Cavity retriangulation (insertion's star-shaped cavity, deletion's
/// gift-wrap, and `clean_up`'s re-triangulation) expand and drain this set;
/// `spec.md` §8 P2/invariant 4 requires it to be empty outside of an active
/// repair step, which `Triangulation` enforces by draining it fully before
/// any public method returns.
#[derive(Debug, Default)]
pub(crate) struct OpenTriangleOrganizer {
    entries: HashMap<[GraphVertex; 3], TriangleId>,
}

impl OpenTriangleOrganizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn key(nodes: [GraphVertex; 3]) -> [GraphVertex; 3] {
        let mut k = nodes;
        k.sort_unstable_by_key(|v| v.rank());
        k
    }

    pub(crate) fn put(&mut self, nodes: [GraphVertex; 3], triangle: TriangleId) {
        self.entries.insert(Self::key(nodes), triangle);
    }

    pub(crate) fn remove(&mut self, nodes: [GraphVertex; 3]) -> Option<TriangleId> {
        self.entries.remove(&Self::key(nodes))
    }

    pub(crate) fn find(&self, nodes: [GraphVertex; 3]) -> Option<TriangleId> {
        self.entries.get(&Self::key(nodes)).copied()
    }

    /// Returns any one stored triangle's key, without removing it.
    pub(crate) fn poll_any(&self) -> Option<[GraphVertex; 3]> {
        self.entries.keys().next().copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of all current keys, for the deletion pass's neighbor
    /// discovery (`spec.md` §4.3 step 3), which needs to look at every open
    /// triangle without draining the set.
    pub(crate) fn keys_snapshot(&self) -> Vec<[GraphVertex; 3]> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn n(i: u32) -> GraphVertex {
        GraphVertex::Point(NodeId(i))
    }

    #[test]
    fn lookup_is_invariant_under_node_permutation() {
        let mut org = OpenTriangleOrganizer::new();
        org.put([n(0), n(1), n(2)], TriangleId(7));
        assert_eq!(org.find([n(2), n(0), n(1)]), Some(TriangleId(7)));
        assert_eq!(org.remove([n(1), n(2), n(0)]), Some(TriangleId(7)));
        assert!(org.is_empty());
    }

    #[test]
    fn hull_side_triangle_keys_with_infinity() {
        let mut org = OpenTriangleOrganizer::new();
        org.put([n(0), n(1), GraphVertex::Infinity], TriangleId(9));
        assert_eq!(
            org.find([GraphVertex::Infinity, n(1), n(0)]),
            Some(TriangleId(9))
        );
    }
}
