// SPDX-License-Identifier: AGPL-3.0-only

//! hotSpring Dirac — matrix-free fermion operators for lattice QCD.
//!
//! Wilson, clover-improved Wilson, naive and improved staggered discretisations,
//! each with and without even-odd (checkerboard) preconditioning, behind one
//! [`operator::Dirac`] contract that Krylov solvers are written against.
//!
//! ## Modules
//!   - `lattice` — geometry, SU(3) links, clover term, spinor fields, stencils
//!   - `operator` — the `Dirac` trait, six variants, factory, functors
//!   - `cg` — conjugate gradient and multi-shift CG over any operator functor
//!   - `invert` — JSON-configurable prepare → solve → reconstruct driver, plus
//!     multi-mass solves
//!   - `tolerances` — every numerical threshold used by tests and validation
//!   - `validation` — pass/fail harness for `validate_dirac`
//!
//! ## Validation binary
//!   - `validate_dirac` — operator identities and reduced-vs-full solves for
//!     every variant on a 4⁴ hot-start lattice

pub mod cg;
pub mod error;
pub mod invert;
pub mod lattice;
pub mod operator;
pub mod tolerances;
pub mod validation;

pub use error::{DiracError, DiracResult};
pub use invert::{
    invert, invert_multishift, BackgroundFields, InvertParam, InvertResult, MultiShiftInvertResult,
};
pub use operator::{Dirac, DiracMatrix, DiracOperator, DiracParam};
