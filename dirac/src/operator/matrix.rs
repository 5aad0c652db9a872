// SPDX-License-Identifier: AGPL-3.0-only

//! Operator-application functors.
//!
//! A Krylov solver is written once against [`DiracMatrix`]; which of `M`,
//! `M†M` or `M†` it inverts, and for which discretisation, is decided by
//! the wrapper it is handed.

use super::Dirac;
use crate::error::DiracResult;
use crate::lattice::spinor::ColorSpinorField;

/// "Apply the configured operator."
pub trait DiracMatrix {
    /// `out = A in`
    ///
    /// # Errors
    ///
    /// Whatever the wrapped operator reports.
    fn apply(&self, out: &mut ColorSpinorField, input: &ColorSpinorField) -> DiracResult<()>;

    /// Flops of the wrapped operator since the last read; resets its counter.
    fn flops(&self) -> u64;
}

macro_rules! functor {
    ($(#[$doc:meta])* $name:ident, $method:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug)]
        pub struct $name<'a, D: Dirac + ?Sized> {
            dirac: &'a D,
        }

        impl<'a, D: Dirac + ?Sized> $name<'a, D> {
            pub fn new(dirac: &'a D) -> Self {
                Self { dirac }
            }
        }

        impl<D: Dirac + ?Sized> DiracMatrix for $name<'_, D> {
            fn apply(
                &self,
                out: &mut ColorSpinorField,
                input: &ColorSpinorField,
            ) -> DiracResult<()> {
                self.dirac.$method(out, input)
            }

            fn flops(&self) -> u64 {
                self.dirac.flops()
            }
        }
    };
}

functor!(
    /// Applies `M`.
    DiracM,
    m
);
functor!(
    /// Applies `M† M`.
    DiracMdagM,
    mdag_m
);
functor!(
    /// Applies `M†`.
    DiracMdag,
    mdag
);
