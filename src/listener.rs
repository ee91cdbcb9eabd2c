//! Movement listener interface consumed by the physics layer (`spec.md`
//! §6). All callbacks are invoked synchronously, inside the mutating call
//! that triggered them; `spec.md` §5 forbids listeners from re-entering the
//! triangulation, which [`crate::triangulation::Triangulation`] enforces
//! with a re-entrancy guard.

use crate::types::{NodeId, Vertex3};

/// Callbacks the physics layer implements to stay in sync with the
/// triangulation's mutations. Default (no-op) bodies let implementers
/// override only the events they care about.
pub trait MovementListener<U> {
    /// Before a position update, exactly once per motion.
    fn node_about_to_move(&mut self, _node: NodeId, _delta: Vertex3) {}

    /// After all flips triggered by a motion complete.
    fn node_moved(&mut self, _node: NodeId) {}

    /// Before insertion creates geometry. `adjacent_user_objects` holds the
    /// four vertices of the containing tetrahedron's cell hint; one slot
    /// is `None` when that vertex is the conceptual point at infinity.
    fn node_about_to_be_added(
        &mut self,
        _node: NodeId,
        _position: Vertex3,
        _adjacent_user_objects: [Option<&U>; 4],
    ) {
    }

    fn node_added(&mut self, _node: NodeId) {}

    fn node_about_to_be_removed(&mut self, _node: NodeId) {}

    fn node_removed(&mut self, _node: NodeId) {}
}

/// A listener that does nothing, for sessions that only need the geometric
/// kernel without a physics layer attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl<U> MovementListener<U> for NullListener {}
