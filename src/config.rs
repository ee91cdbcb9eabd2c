//! Tunable knobs the spec leaves to the implementer (`spec.md` §9).

/// Numerically-tunable configuration for a [`crate::triangulation::Triangulation`].
///
/// None of these affect the triangulation's *semantics* (the Delaunay
/// property, the invariants in `spec.md` §3); they only affect how much
/// slack the adaptive float predicate gets before falling back to the exact
/// path, and how long `clean_up` is allowed to spin before the kernel gives
/// up and reports [`crate::error::KernelError::InvariantViolated`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelConfig {
    /// Multiplier applied to the term-by-term error bound computed for each
    /// tetrahedron's circumsphere (`spec.md` §4.1). Larger values shrink the
    /// region in which the exact predicate is invoked, trading a little
    /// numerical risk for speed. 1.0 is the mathematically-derived bound;
    /// values below 1.0 are unsound and rejected by [`KernelConfig::new`].
    pub tolerance_multiplier: f64,

    /// Upper bound on the number of outer-loop iterations `clean_up` may
    /// take while retriangulating a messed-up region before the kernel
    /// gives up and reports [`crate::error::KernelError::InvariantViolated`].
    /// `spec.md` §9 notes the source has no such guard; this crate adds one.
    pub max_cleanup_iterations: u32,

    /// Modulus at which the session-global checking-index counter wraps
    /// (`spec.md` §4.4, §8 P5).
    pub checking_index_modulus: u64,
}

impl KernelConfig {
    /// Checking-index wraparound modulus mandated by `spec.md` §4.4.
    pub const SPEC_CHECKING_INDEX_MODULUS: u64 = 2_000_000_000;

    /// Builds a configuration, rejecting an unsound tolerance multiplier.
    pub fn new(tolerance_multiplier: f64, max_cleanup_iterations: u32) -> Self {
        assert!(
            tolerance_multiplier >= 1.0,
            "tolerance_multiplier must be >= 1.0 to keep the float fast path sound"
        );
        Self {
            tolerance_multiplier,
            max_cleanup_iterations,
            checking_index_modulus: Self::SPEC_CHECKING_INDEX_MODULUS,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new(1.0, 64)
    }
}
