//! `Tetrahedron`: four nodes, four triangles, six edges (`spec.md` §3 C6).
//!
//! This module holds the arena-free geometric core — the data record and
//! the pure functions that only need resolved vertex positions. Operations
//! that create or destroy tetrahedra (the two constructors, the flips, the
//! visibility walk) need the triangulation's arenas to wire up shared
//! triangles and edges, so — mirroring how the teacher crate splits
//! `TetDataStructure` (storage) from `Tetrahedralization` (orchestration) —
//! they live in [`crate::triangulation`].

use crate::predicates::exact_in_sphere_sign;
use crate::types::{EdgeId, GraphVertex, NodeId, TetId, TriangleId, Vertex3};

/// Re-exported for call sites that think of tetrahedron vertices
/// specifically; identical to [`GraphVertex`].
pub type TetVertex = GraphVertex;

/// For triangle index *i* (opposite vertex *i*), the tetrahedron-local
/// vertex indices of its three corners, in outward-facing order.
///
/// Grounded on the teacher crate's `TRIANGLE_SUBINDICES` table
/// (`rita/src/tetds/tet_data_structure.rs`).
pub(crate) const FACE_VERTS: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [0, 3, 1], [0, 1, 2]];

/// Standard tetrahedron edge numbering: edge *e* connects these two
/// tetrahedron-local vertex indices.
pub(crate) const EDGE_VERTS: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

pub(crate) fn edge_local_index(i: usize, j: usize) -> usize {
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    EDGE_VERTS
        .iter()
        .position(|&[a, b]| a == lo && b == hi)
        .expect("invalid tetrahedron-local vertex pair")
}

/// Tag distinguishing the three tetrahedron subtypes named in `spec.md` §3
/// and §9 ("Express as a tagged variant... rather than subclassing").
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TetKind {
    Finite,
    /// Four coplanar nodes; volume identically 0, circumsphere undefined.
    Flat,
    /// One vertex slot is [`TetVertex::Infinity`]; represents a convex-hull
    /// face.
    Infinite,
}

/// The data owned by a tetrahedron.
#[derive(Debug, Clone)]
pub(crate) struct TetData {
    pub(crate) vertices: [TetVertex; 4],
    /// Triangle at index *i* is opposite vertex *i*.
    pub(crate) triangles: [TriangleId; 4],
    /// Edge at standard index *e* (see [`EDGE_VERTS`]); `None` when that
    /// slot's pair involves the conceptual point at infinity, since there
    /// is no [`crate::edge::Edge`] entity to infinity (`spec.md` §3 Edge
    /// identity is "unordered pair of nodes", real nodes only).
    pub(crate) edges: [Option<EdgeId>; 6],
    pub(crate) kind: TetKind,
    pub(crate) circumcenter: Vertex3,
    pub(crate) circumradius_sq: f64,
    /// Upper bound on the absolute error of `circumradius_sq`, accumulated
    /// term-by-term from the pairwise-difference products that built it
    /// (`spec.md` §4.1).
    pub(crate) tolerance: f64,
    pub(crate) volume: f64,
    pub(crate) cross_section: [f64; 6],
    /// Cleared and detached from all neighbors on removal; the object may
    /// still be referenced by in-flight iterators (`spec.md` §3 Lifecycle).
    pub(crate) valid: bool,
}

impl TetData {
    /// A not-yet-wired placeholder inserted to reserve a [`TetId`] before
    /// its triangles/edges are known, so the two-phase build in
    /// [`crate::triangulation::Triangulation::build_tet`] can attach
    /// triangles to an id that already exists.
    pub(crate) fn placeholder(vertices: [TetVertex; 4]) -> Self {
        Self {
            vertices,
            triangles: [TriangleId(0); 4],
            edges: [None; 6],
            kind: TetKind::Flat,
            circumcenter: [0.0; 3],
            circumradius_sq: 0.0,
            tolerance: 0.0,
            volume: 0.0,
            cross_section: [0.0; 6],
            valid: false,
        }
    }

    pub(crate) const fn is_infinite(&self) -> bool {
        matches!(self.kind, TetKind::Infinite)
    }

    pub(crate) const fn is_flat(&self) -> bool {
        matches!(self.kind, TetKind::Flat)
    }

    pub(crate) fn node_at(&self, local: usize) -> Option<NodeId> {
        self.vertices[local].node()
    }

    /// The real (non-infinite) nodes of this tetrahedron, in
    /// tetrahedron-local order, skipping the infinite slot if any.
    pub(crate) fn real_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.vertices.iter().filter_map(|v| v.node())
    }

    pub(crate) fn local_index_of(&self, node: NodeId) -> Option<usize> {
        self.vertices.iter().position(|v| v.node() == Some(node))
    }

    /// Local index of the vertex at infinity, if any. `new_tet_from_base_triangle`
    /// puts the apex at slot 0 regardless of whether it or one of the base
    /// triangle's own vertices is the infinite one (`spec.md` §4.1's
    /// "opposite node" constructor always treats slot 0 as the vertex
    /// opposite the reused base face), so a hull tetrahedron capped with a
    /// real apex against an already-hull-adjacent base can carry infinity
    /// in any slot. Callers that need the infinite vertex specifically must
    /// look it up rather than assume slot 0.
    pub(crate) fn infinite_slot(&self) -> Option<usize> {
        self.vertices.iter().position(|v| v.is_infinity())
    }
}

/// Computes the circumsphere (center, squared radius) and volume of a
/// finite tetrahedron via the standard 3×3 linear system derived from
/// pairwise-difference dot products (`spec.md` §4.1), alongside a
/// term-by-term upper bound on the absolute error of the squared-radius
/// result.
///
/// Returns `None` if the tetrahedron is flat (the system is singular).
pub(crate) fn circumsphere(p: [Vertex3; 4]) -> Option<(Vertex3, f64, f64, f64)> {
    use nalgebra::{Matrix3, Vector3};

    let d1 = Vector3::new(p[1][0] - p[0][0], p[1][1] - p[0][1], p[1][2] - p[0][2]);
    let d2 = Vector3::new(p[2][0] - p[0][0], p[2][1] - p[0][1], p[2][2] - p[0][2]);
    let d3 = Vector3::new(p[3][0] - p[0][0], p[3][1] - p[0][1], p[3][2] - p[0][2]);

    let m = Matrix3::from_rows(&[d1.transpose(), d2.transpose(), d3.transpose()]);
    let det = m.determinant();
    let volume = det.abs() / 6.0;

    if det.abs() < 1e-300 {
        return None;
    }

    let b = Vector3::new(0.5 * d1.dot(&d1), 0.5 * d2.dot(&d2), 0.5 * d3.dot(&d3));
    let t = m.try_inverse()? * b;

    let center = [
        p[0][0] + t[0] * d1[0] + t[1] * d2[0] + t[2] * d3[0],
        p[0][1] + t[0] * d1[1] + t[1] * d2[1] + t[2] * d3[1],
        p[0][2] + t[0] * d1[2] + t[1] * d2[2] + t[2] * d3[2],
    ];

    let dx = center[0] - p[0][0];
    let dy = center[1] - p[0][1];
    let dz = center[2] - p[0][2];
    let radius_sq = dx * dx + dy * dy + dz * dz;

    // Term-by-term error accumulation: each coordinate difference and
    // product carries a relative error on the order of machine epsilon;
    // summed through four multiplications and three additions, scaled by
    // the magnitude of the inputs, this gives a conservative envelope (see
    // `spec.md` §4.1 "upper bound on absolute error").
    const EPS: f64 = f64::EPSILON;
    let magnitude = p
        .iter()
        .flat_map(|v| v.iter().copied())
        .fold(0.0_f64, |acc, c| acc.max(c.abs()))
        .max(radius_sq.sqrt())
        .max(1.0);
    let tolerance = 64.0 * EPS * magnitude * magnitude;

    Some((center, radius_sq, tolerance, volume))
}

/// Adaptive in-sphere test for a finite, non-flat tetrahedron (`spec.md`
/// §4.1 `orientation(point)`).
///
/// Returns `-1`/`0`/`+1` for outside/on/inside.
pub(crate) fn orientation_finite(
    p: [Vertex3; 4],
    circumcenter: Vertex3,
    circumradius_sq: f64,
    tolerance: f64,
    tolerance_multiplier: f64,
    point: Vertex3,
) -> i32 {
    let dx = point[0] - circumcenter[0];
    let dy = point[1] - circumcenter[1];
    let dz = point[2] - circumcenter[2];
    let dist_sq = dx * dx + dy * dy + dz * dz;
    let diff = dist_sq - circumradius_sq;

    if diff.abs() > tolerance * tolerance_multiplier {
        return if diff < 0.0 { 1 } else { -1 };
    }

    exact_in_sphere_sign(p, point)
}

/// In-sphere test for an infinite tetrahedron: the real orientation test
/// against the hull-face plane, as `spec.md` §3/§4.4 and GLOSSARY describe
/// (a point is "inside" the conceptual circumsphere exactly when it lies
/// outside the current convex hull through this face).
pub(crate) fn orientation_infinite(face: [Vertex3; 3], point: Vertex3) -> i32 {
    use crate::predicates::exact_orient3d;
    -exact_orient3d(face[0], face[1], face[2], point)
}

/// In-sphere test for a flat tetrahedron (`spec.md` §4.1): points off the
/// tetrahedron's plane are outside; in-plane points are tested against
/// each facet's circumcircle and are "inside" if they fall inside any one
/// of them (a flat tetrahedron has no single circumsphere, so this is the
/// most permissive reading consistent with it being removed outright by
/// the specialized flat-pair-removal flip rather than relied on for
/// Delaunay-ness).
pub(crate) fn orientation_flat(p: [Vertex3; 4], point: Vertex3) -> i32 {
    use crate::triangle::{compute_plane, signed_side};

    let plane = compute_plane(p[0], p[1], p[2]);
    let (normal, _) = plane;
    let normal_len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if normal_len > 1e-12 {
        let dist = signed_side(plane, point).abs() / normal_len;
        if dist > 1e-9 {
            return -1;
        }
    }

    for face in FACE_VERTS {
        let tri = [p[face[0]], p[face[1]], p[face[2]]];
        if in_circumcircle_2d(tri, point) > 0 {
            return 1;
        }
    }
    -1
}

/// 2D-in-plane circumcircle test (points are assumed coplanar). Projects
/// onto the coordinate plane in which the triangle has the largest area to
/// avoid degeneracy from projecting out a near-zero axis.
fn in_circumcircle_2d(tri: [Vertex3; 3], point: Vertex3) -> i32 {
    let u = [tri[1][0] - tri[0][0], tri[1][1] - tri[0][1], tri[1][2] - tri[0][2]];
    let v = [tri[2][0] - tri[0][0], tri[2][1] - tri[0][1], tri[2][2] - tri[0][2]];
    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let (ax0, ax1) = if cross[2].abs() >= cross[0].abs() && cross[2].abs() >= cross[1].abs() {
        (0, 1)
    } else if cross[1].abs() >= cross[0].abs() {
        (0, 2)
    } else {
        (1, 2)
    };

    let proj = |v: Vertex3| [v[ax0], v[ax1]];
    let (a, b, c, d) = (proj(tri[0]), proj(tri[1]), proj(tri[2]), proj(point));

    // Standard incircle determinant.
    let adx = a[0] - d[0];
    let ady = a[1] - d[1];
    let bdx = b[0] - d[0];
    let bdy = b[1] - d[1];
    let cdx = c[0] - d[0];
    let cdy = c[1] - d[1];

    let ad2 = adx * adx + ady * ady;
    let bd2 = bdx * bdx + bdy * bdy;
    let cd2 = cdx * cdx + cdy * cdy;

    let det = adx * (bdy * cd2 - cdy * bd2) - ady * (bdx * cd2 - cdx * bd2)
        + ad2 * (bdx * cdy - cdx * bdy);

    if det > 1e-12 {
        1
    } else if det < -1e-12 {
        -1
    } else {
        0
    }
}

/// Tests whether two tetrahedra sharing triangle `(a, b, c)` with opposite
/// apices `p`, `q` are in convex position, i.e. the 2→3 flip is valid
/// (`spec.md` §4.1 "2→3 flip").
pub(crate) fn is_in_convex_position(a: Vertex3, b: Vertex3, c: Vertex3, p: Vertex3, q: Vertex3) -> bool {
    use crate::predicates::exact_orient3d;
    // p and q must be strictly on opposite sides of every facet of the
    // bipyramid {p,q,a,b}, {p,q,b,c}, {p,q,c,a} for the union to be convex;
    // equivalently, p must see triangle (a,b,c) from the opposite side of q.
    let orient_p = exact_orient3d(a, b, c, p);
    let orient_q = exact_orient3d(a, b, c, q);
    orient_p != 0 && orient_q != 0 && orient_p.signum() != orient_q.signum()
}

/// Per-edge cross-section contribution of a tetrahedron (`spec.md` §4.1
/// "Cross-section accounting"): the area of the quadrilateral fan
/// `midpoint(edge) -> circumcenter(face1) -> circumcenter(tet) ->
/// circumcenter(face2)`, i.e. the facet of the dual (Voronoi) cell that
/// lies inside this tetrahedron and is dual to this edge. Flat and
/// infinite tetrahedra contribute nothing (no meaningful dual cell).
pub(crate) fn edge_cross_sections(p: [Vertex3; 4], circumcenter: Vertex3) -> [f64; 6] {
    let mut out = [0.0; 6];
    for (edge_idx, &[i, j]) in EDGE_VERTS.iter().enumerate() {
        let other = (0..4).filter(|&k| k != i && k != j).collect::<Vec<_>>();
        let (k, l) = (other[0], other[1]);

        let mid = midpoint(p[i], p[j]);
        let face1 = face_circumcenter([p[i], p[j], p[k]]);
        let face2 = face_circumcenter([p[i], p[j], p[l]]);

        out[edge_idx] = triangle_area(mid, face1, circumcenter) + triangle_area(mid, circumcenter, face2);
    }
    out
}

fn midpoint(a: Vertex3, b: Vertex3) -> Vertex3 {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0]
}

fn triangle_area(a: Vertex3, b: Vertex3, c: Vertex3) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt()
}

/// Circumcenter of a triangle, computed in its own plane (`spec.md` §4.1
/// cross-section accounting needs the per-face dual vertex).
fn face_circumcenter(tri: [Vertex3; 3]) -> Vertex3 {
    let a = tri[0];
    let u = [tri[1][0] - a[0], tri[1][1] - a[1], tri[1][2] - a[2]];
    let v = [tri[2][0] - a[0], tri[2][1] - a[1], tri[2][2] - a[2]];

    let uu = u[0] * u[0] + u[1] * u[1] + u[2] * u[2];
    let vv = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
    let uv = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];

    let denom = uu * vv - uv * uv;
    if denom.abs() < 1e-300 {
        return midpoint(tri[1], tri[2]);
    }

    // Closed form: center = a + x*u + y*v where
    // [uu uv; uv vv] [x;y] = 0.5*[uu; vv]
    let rhs0 = 0.5 * uu;
    let rhs1 = 0.5 * vv;
    let x = (rhs0 * vv - rhs1 * uv) / denom;
    let y = (uu * rhs1 - uv * rhs0) / denom;

    [a[0] + x * u[0] + y * v[0], a[1] + x * u[1] + y * v[1], a[2] + x * u[2] + y * v[2]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circumsphere_of_unit_tet_has_expected_volume() {
        let p = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let (_, _, _, volume) = circumsphere(p).unwrap();
        assert!((volume - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn face_circumcenter_is_equidistant_from_corners() {
        let tri = [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
        let c = face_circumcenter(tri);
        let d0 = (c[0] - tri[0][0]).powi(2) + (c[1] - tri[0][1]).powi(2);
        let d1 = (c[0] - tri[1][0]).powi(2) + (c[1] - tri[1][1]).powi(2);
        let d2 = (c[0] - tri[2][0]).powi(2) + (c[1] - tri[2][1]).powi(2);
        assert!((d0 - d1).abs() < 1e-9);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn convex_position_detects_bipyramid() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        let p = [0.0, 0.0, 1.0];
        let q = [0.0, 0.0, -1.0];
        assert!(is_in_convex_position(a, b, c, p, q));
        assert!(!is_in_convex_position(a, b, c, p, [0.1, 0.1, 2.0]));
    }
}
