// SPDX-License-Identifier: AGPL-3.0-only

//! Machine-precision tolerances (IEEE 754 f64).

/// Tolerance for operations that should be exact in f64 arithmetic.
///
/// f64 has ~15.9 significant digits; 1e-10 allows 5 digits of accumulated
/// rounding in compositions of exact operations (a few stencil sweeps and
/// reductions over a small lattice).
pub const EXACT_F64: f64 = 1e-10;

/// Tolerance for f64 results of iterative algorithms.
///
/// A Krylov solve accumulates O(iterations) rounding steps. 1e-8 keeps
/// ~7 digits after a few hundred iterations.
pub const ITERATIVE_F64: f64 = 1e-8;
