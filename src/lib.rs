//! # neurotess
//!
//! A dynamic 3D Delaunay triangulation kernel for moving, growing point
//! sets: incremental insertion, deletion, and motion-with-local-flip
//! restoration over an arena of nodes, edges, triangles, and tetrahedra.

pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use listener::{MovementListener, NullListener};
pub use triangle_order::{IdentityTriangleOrder, SeededTriangleOrder, ThreadRngTriangleOrder, TriangleOrderSource};
pub use tetrahedron::TetKind;
pub use triangulation::Triangulation;
pub use types::{EdgeId, NodeId, TetId, TriangleId, Vertex3};

pub mod config;
mod edge;
pub mod error;
pub mod listener;
mod node;
mod open_triangle;
mod predicates;
mod tetrahedron;
mod triangle;
pub mod triangle_order;
pub mod triangulation;
mod types;

#[cfg(test)]
mod test_utils {
    use std::ops::RangeInclusive;

    use rand::distributions::Uniform;
    use rand::prelude::Distribution;

    /// Uniformly-sampled points in a cube, for exercising insertion and
    /// motion without hand-picking coordinates.
    pub fn sample_points_3d(n: usize, range: Option<RangeInclusive<f64>>) -> Vec<[f64; 3]> {
        let mut rng = rand::thread_rng();
        let range = range.unwrap_or(-0.5..=0.5);
        let uniform = Uniform::from(range);

        let mut points = Vec::with_capacity(n);
        for _ in 0..n {
            points.push([uniform.sample(&mut rng), uniform.sample(&mut rng), uniform.sample(&mut rng)]);
        }
        points
    }
}
