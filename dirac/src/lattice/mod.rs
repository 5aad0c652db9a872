// SPDX-License-Identifier: AGPL-3.0-only

//! Lattice substrate for the Dirac operators.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `constants` | Lattice sizes, flop weights, LCG PRNG, numerical guards |
//! | `su3` | SU(3) 3×3 complex matrices and colour vectors |
//! | `geometry` | 4D extents, lexicographic and checkerboard indexing |
//! | `gauge` | Link fields with time boundary condition |
//! | `clover` | Per-site clover term as two 6×6 chiral blocks |
//! | `spinor` | Colour-spinor fields and level-1 linear algebra |
//! | `stencil` | CPU reference hopping and clover kernels |
//!
//! # References
//!
//! - Gattringer & Lang, "Quantum Chromodynamics on the Lattice" (2010)
//! - DeGrand & Detar, "Lattice Methods for Quantum Chromodynamics" (2006)

/// Per-site clover term and its inverse.
pub mod clover;
/// Lattice constants, LCG PRNG and shared numerical guards.
pub mod constants;
/// SU(3) link fields: thin, fat and long.
pub mod gauge;
/// Lattice extents, parity and checkerboard indexing.
pub mod geometry;
/// Colour-spinor fields (full or single parity).
pub mod spinor;
/// Wilson, staggered and clover stencil kernels.
pub mod stencil;
/// SU(3) 3x3 complex matrix operations.
pub mod su3;
