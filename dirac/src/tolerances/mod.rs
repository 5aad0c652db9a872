// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized validation tolerances with numerical justification.
//!
//! Every threshold used by tests and the validation binary is defined here
//! with documentation of its origin. No ad-hoc magic numbers.
//!
//! # Tolerance categories
//!
//! | Category | Basis | Example |
//! |----------|-------|---------|
//! | Machine precision | IEEE 754 f64 | 1e-12 for a single stencil sweep |
//! | Operator identities | Rounding over a few sweeps | 1e-10 for adjointness |
//! | Numerical method | Solver convergence | 1e-8 for reconstructed solutions |

/// Machine-precision tolerances.
pub mod core;
/// Dirac operators, clover inversion and Krylov solves.
pub mod lattice;

pub use core::{EXACT_F64, ITERATIVE_F64};

pub use lattice::{
    CLOVER_INVERSE_ABS, GAMMA5_HERMITICITY_REL, INVERT_DEFAULT_MAXITER, INVERT_DEFAULT_TOL,
    LATTICE_CG_RESIDUAL, LATTICE_CG_VERIFY_RESIDUAL, MULTISHIFT_SOLUTION_REL, OPERATOR_ADJOINT_REL,
    OPERATOR_IDENTITY_ABS, RECONSTRUCTED_SOLUTION_REL, STENCIL_EXACT_ABS,
};
