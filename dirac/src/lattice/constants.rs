// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized constants for the lattice substrate and the stencil kernels.
//!
//! Collects colour/spin counts, per-site flop weights used for performance
//! accounting, numerical guards, and the LCG PRNG that builds reproducible
//! gauge, clover and spinor configurations.

/// Number of colors in QCD (SU(3)).
pub const N_COLORS: usize = 3;

/// Number of spacetime dimensions.
pub const N_DIM: usize = 4;

/// Spin components per site for Wilson-type fermions.
pub const WILSON_NSPIN: usize = 4;

/// Staggered fermions carry colour only.
pub const STAGGERED_NSPIN: usize = 1;

/// Reach of the staggered long (Naik) link in lattice spacings.
pub const NAIK_HOP: usize = 3;

/// Dimension of one chiral block of the clover term (2 spins × 3 colours).
pub const CLOVER_BLOCK: usize = 6;

/// Flops per output site of the Wilson hopping term.
///
/// Eight neighbours, each a spin projection (12), two SU(3)×half-spinor
/// products (132) and the reconstruction/accumulation (24).
pub const WILSON_DSLASH_FLOPS: u64 = 1320;

/// Flops per output site of the staggered fat + Naik hopping term.
///
/// Sixteen SU(3)×colour-vector products (66 each) plus accumulation.
pub const STAGGERED_DSLASH_FLOPS: u64 = 1146;

/// Flops per output site of the naive (one-hop only) staggered term.
pub const NAIVE_STAGGERED_DSLASH_FLOPS: u64 = 570;

/// Flops per site for one clover (or clover-inverse) application.
///
/// Two Hermitian 6×6 complex block products.
pub const CLOVER_FLOPS: u64 = 504;

/// Flops per complex component for the fused `+ k·x` accumulation.
pub const XPAY_FLOPS_PER_COMPONENT: u64 = 4;

/// Pivot guard for the clover block inversion.
///
/// A pivot with squared modulus below this marks the block as singular.
pub const CLOVER_PIVOT_GUARD: f64 = 1e-24;

/// Division guard for CG inner products.
pub const LATTICE_DIVISION_GUARD: f64 = 1e-30;

/// LCG multiplier (Knuth MMIX).
pub const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// LCG increment (Knuth MMIX).
pub const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// 53-bit mantissa divisor for LCG → uniform [0, 1).
pub const LCG_53_DIVISOR: f64 = (1u64 << 53) as f64;

/// Advance the LCG state by one step.
#[inline]
pub fn lcg_step(seed: &mut u64) {
    *seed = seed.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT);
}

/// Uniform f64 in [0, 1) from 53 bits of LCG state.
#[inline]
pub fn lcg_uniform_f64(seed: &mut u64) -> f64 {
    lcg_step(seed);
    (*seed >> 11) as f64 / LCG_53_DIVISOR
}

/// Box-Muller Gaussian deviate N(0, 1) from two LCG draws.
///
/// The `ln` argument is clamped to `LATTICE_DIVISION_GUARD` to avoid ln(0).
#[inline]
pub fn lcg_gaussian(seed: &mut u64) -> f64 {
    let u1 = lcg_uniform_f64(seed);
    let u2 = lcg_uniform_f64(seed);
    (-2.0 * u1.max(LATTICE_DIVISION_GUARD).ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
