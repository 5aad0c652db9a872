// SPDX-License-Identifier: AGPL-3.0-only

//! Dirac operator, clover and solver tolerances.

use super::core::{EXACT_F64, ITERATIVE_F64};

/// Single stencil sweep against a hand-evaluated value.
///
/// One site touches at most 8 (Wilson) or 16 (staggered) neighbours, each a
/// 3×3 complex matrix-vector product: O(100) roundings of order 1e-16.
pub const STENCIL_EXACT_ABS: f64 = 1e-12;

/// `A A⁻¹ = 1` for a 6×6 clover block.
///
/// Gauss-Jordan with partial pivoting on a well-conditioned Hermitian block
/// (diagonal ≈ 1, off-diagonal ≲ 0.3) loses at most a few digits.
pub const CLOVER_INVERSE_ABS: f64 = 1e-12;

/// Operator identities evaluated element by element.
///
/// Schur complements built by hand, `M + M† = 4m` for staggered, zero
/// kappa giving the identity: a handful of sweeps, max-abs comparison.
pub const OPERATOR_IDENTITY_ABS: f64 = EXACT_F64;

/// `<u, M v> = <M† u, v>` relative to `|<u, M v>|`.
///
/// Global inner products sum O(volume) terms; on 2⁴-4⁴ lattices the
/// relative rounding stays below 1e-12.
pub const OPERATOR_ADJOINT_REL: f64 = EXACT_F64;

/// `γ5 M γ5 = M†` for Wilson-type operators, relative max-abs difference.
pub const GAMMA5_HERMITICITY_REL: f64 = EXACT_F64;

/// CG solver residual: upper bound.
///
/// The conjugate gradient solver for M†M x = b should converge to a
/// relative residual below 1e-6 on a lattice with κ well below critical.
pub const LATTICE_CG_RESIDUAL: f64 = 1e-6;

/// CG solution verification: |M†M x − b| / |b| after convergence.
///
/// The recomputed residual differs from the recursively updated one by
/// accumulated rounding; a factor of 10 over the target suffices.
pub const LATTICE_CG_VERIFY_RESIDUAL: f64 = 1e-5;

/// Default relative residual for the inversion driver.
///
/// The error in the solution is bounded by cond(M†M) times the residual.
/// Test lattices have cond(M†M) ≲ 10³, so 1e-12 keeps an even-odd reduced
/// solve and an unpreconditioned solve within [`RECONSTRUCTED_SOLUTION_REL`].
pub const INVERT_DEFAULT_TOL: f64 = 1e-12;

/// Default CG iteration cap for the inversion driver.
///
/// Heavy-quark test lattices converge in O(100) iterations; 10 000 leaves
/// room for near-critical κ without looping forever on a singular system.
pub const INVERT_DEFAULT_MAXITER: usize = 10_000;

/// Reduced-then-reconstructed solution against a direct full solve.
///
/// Both solves stop at [`INVERT_DEFAULT_TOL`]; the condition number of
/// M†M on test lattices (≲ 10³) amplifies that to ≲ 1e-9 in the solution.
pub const RECONSTRUCTED_SOLUTION_REL: f64 = ITERATIVE_F64;

/// Multi-shift solution against a single-shift CG solve of the same system.
///
/// Both stop at a residual of 1e-10; the shifted residuals are updated
/// recursively, so their drift from the true residual adds to the
/// cond(A + σ) ≲ 10³ amplification.
pub const MULTISHIFT_SOLUTION_REL: f64 = 1e-6;
