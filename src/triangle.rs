//! `Triangle`: an ordered triple of nodes with a cached plane equation
//! (`spec.md` §3 C5).

pub use crate::types::TriangleId;
use crate::types::{GraphVertex, TetId, Vertex3};

/// Lazily-computed plane equation `normal · x + offset = 0`, with the
/// dirty-flag behavior folded into `Option`: `None` means "needs
/// recomputation."
pub(crate) type Plane = (Vertex3, f64);

/// The data owned by a triangle. Registered in the
/// [`crate::open_triangle::OpenTriangleOrganizer`] while it has only one
/// incident tetrahedron; destroyed when both incident tetrahedra are
/// removed (`spec.md` §3).
#[derive(Debug, Clone)]
pub(crate) struct TriangleData {
    /// A hull-side triangle (one of a convex-hull tetrahedron's three
    /// "side" faces) carries [`GraphVertex::Infinity`] in one slot; an
    /// interior triangle is all [`GraphVertex::Point`] (`spec.md` §3,
    /// GLOSSARY "Infinite tetrahedron").
    pub(crate) nodes: [GraphVertex; 3],
    /// Slot 0 is conventionally the "lower" side, slot 1 the "upper" side.
    pub(crate) tets: [Option<TetId>; 2],
    pub(crate) plane: Option<Plane>,
    /// Marks this triangle as already visited within one Delaunay
    /// restoration pass (`spec.md` §4.4, §8 P5). Never decreases within a
    /// pass.
    pub(crate) checking_index: u64,
}

impl TriangleData {
    pub(crate) fn new(nodes: [GraphVertex; 3]) -> Self {
        Self {
            nodes,
            tets: [None, None],
            plane: None,
            checking_index: 0,
        }
    }

    /// The unordered key identifying this triangle, invariant under vertex
    /// permutation (`spec.md` §3 identity, §4.6 Organizer hashing).
    pub(crate) fn key(nodes: [GraphVertex; 3]) -> [GraphVertex; 3] {
        let mut k = nodes;
        k.sort_unstable_by_key(|v| v.rank());
        k
    }

    /// `true` once a second tetrahedron has attached; such a triangle is
    /// closed and must not be in the Open-Triangle Organizer.
    pub(crate) const fn is_closed(&self) -> bool {
        self.tets[0].is_some() && self.tets[1].is_some()
    }

    pub(crate) fn attach(&mut self, tet: TetId) {
        if self.tets[0].is_none() {
            self.tets[0] = Some(tet);
        } else {
            debug_assert!(self.tets[1].is_none(), "triangle already has two incident tetrahedra");
            self.tets[1] = Some(tet);
        }
    }

    pub(crate) fn detach(&mut self, tet: TetId) {
        if self.tets[0] == Some(tet) {
            self.tets[0] = None;
        } else if self.tets[1] == Some(tet) {
            self.tets[1] = None;
        }
        // keep slot 0 populated when only one side remains
        if self.tets[0].is_none() && self.tets[1].is_some() {
            self.tets.swap(0, 1);
        }
    }

    pub(crate) fn other_side(&self, tet: TetId) -> Option<TetId> {
        if self.tets[0] == Some(tet) {
            self.tets[1]
        } else if self.tets[1] == Some(tet) {
            self.tets[0]
        } else {
            None
        }
    }

    pub(crate) fn invalidate_plane(&mut self) {
        self.plane = None;
    }
}

/// Computes the plane equation for a triangle, oriented so the normal
/// follows the right-hand rule of `(n0, n1, n2)`.
pub(crate) fn compute_plane(p0: Vertex3, p1: Vertex3, p2: Vertex3) -> Plane {
    let u = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
    let v = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
    let normal = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let offset = -(normal[0] * p0[0] + normal[1] * p0[1] + normal[2] * p0[2]);
    (normal, offset)
}

/// Signed distance of `p` from the plane (not normalized); its sign alone
/// determines which side of the triangle's plane `p` lies on, which is all
/// `spec.md` §4.1's visibility walk needs.
pub(crate) fn signed_side(plane: Plane, p: Vertex3) -> f64 {
    let (normal, offset) = plane;
    normal[0] * p[0] + normal[1] * p[1] + normal[2] * p[2] + offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_side_sign_matches_normal_direction() {
        let plane = compute_plane([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert!(signed_side(plane, [0.0, 0.0, 1.0]) > 0.0);
        assert!(signed_side(plane, [0.0, 0.0, -1.0]) < 0.0);
        assert!(signed_side(plane, [0.3, 0.3, 0.0]).abs() < 1e-12);
    }
}
