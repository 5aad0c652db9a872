// SPDX-License-Identifier: AGPL-3.0-only

//! Operator construction parameters and the solver-facing enums.
//!
//! Every enum serialises with `snake_case` names so a solver configuration
//! can be written as plain JSON. Enums with an `Invalid` variant default to
//! it: a record that was never filled in cannot build an operator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::workspace::ScratchPool;
use crate::error::{DiracError, DiracResult};
use crate::invert::{BackgroundFields, InvertParam};
use crate::lattice::clover::CloverField;
use crate::lattice::constants::{STAGGERED_NSPIN, WILSON_NSPIN};
use crate::lattice::gauge::GaugeField;
use crate::lattice::geometry::Parity;
use crate::lattice::spinor::Precision;

/// Concrete operator variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiracType {
    #[default]
    Invalid,
    Wilson,
    WilsonPc,
    Clover,
    CloverPc,
    Staggered,
    StaggeredPc,
}

impl DiracType {
    #[must_use]
    pub const fn is_preconditioned(self) -> bool {
        matches!(self, Self::WilsonPc | Self::CloverPc | Self::StaggeredPc)
    }
}

/// Even-odd preconditioning convention.
///
/// The first parity named is the one retained by the reduced system.
/// Asymmetric forms leave the clover term undivided on the retained parity;
/// for Wilson and staggered operators the two forms coincide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatPcType {
    #[default]
    Invalid,
    EvenEven,
    OddOdd,
    EvenEvenAsymmetric,
    OddOddAsymmetric,
}

impl MatPcType {
    /// Parity retained by the reduced system.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] for [`MatPcType::Invalid`].
    pub fn parity(self) -> DiracResult<Parity> {
        match self {
            Self::EvenEven | Self::EvenEvenAsymmetric => Ok(Parity::Even),
            Self::OddOdd | Self::OddOddAsymmetric => Ok(Parity::Odd),
            Self::Invalid => Err(DiracError::unsupported("invalid matpc type")),
        }
    }

    #[must_use]
    pub const fn is_asymmetric(self) -> bool {
        matches!(self, Self::EvenEvenAsymmetric | Self::OddOddAsymmetric)
    }
}

/// Whether an operator applies `M` or `M†`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagType {
    #[default]
    Invalid,
    No,
    Yes,
}

impl DagType {
    /// The opposite convention. `Invalid` stays invalid.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::No => Self::Yes,
            Self::Yes => Self::No,
            Self::Invalid => Self::Invalid,
        }
    }

    #[must_use]
    pub const fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Which system the caller wants solved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionType {
    /// `M x = b` on the full lattice.
    #[default]
    Mat,
    /// `M†M x = b` on the full lattice.
    MatDagMat,
    /// `M_pc x = b` on the retained parity.
    MatPc,
    /// `M_pc† M_pc x = b` on the retained parity.
    MatPcDagMatPc,
}

/// How the solver attacks the system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveType {
    /// Krylov solve directly on `M`.
    Direct,
    /// Krylov solve directly on the preconditioned `M`.
    DirectPc,
    /// Normal equations on `M`.
    NormalEq,
    /// Normal equations on the preconditioned `M`.
    #[default]
    NormalEqPc,
}

impl SolveType {
    #[must_use]
    pub const fn is_preconditioned(self) -> bool {
        matches!(self, Self::DirectPc | Self::NormalEqPc)
    }

    #[must_use]
    pub const fn is_normal(self) -> bool {
        matches!(self, Self::NormalEq | Self::NormalEqPc)
    }
}

/// Fermion discretisation as named by a solver configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DslashType {
    #[default]
    Wilson,
    Clover,
    /// Naive staggered on thin links.
    Staggered,
    /// Improved staggered with fat and Naik links.
    Asqtad,
}

impl DslashType {
    #[must_use]
    pub const fn is_staggered(self) -> bool {
        matches!(self, Self::Staggered | Self::Asqtad)
    }

    /// Spin components of the fields the discretisation acts on.
    #[must_use]
    pub const fn nspin(self) -> usize {
        if self.is_staggered() {
            STAGGERED_NSPIN
        } else {
            WILSON_NSPIN
        }
    }
}

/// How much an operator and its solver report.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Silent,
    Summarize,
    Verbose,
    Debug,
}

/// Everything the factory needs to build one operator.
///
/// Background fields are shared, never copied.
#[derive(Clone, Debug, Default)]
pub struct DiracParam {
    pub dirac_type: DiracType,
    pub kappa: f64,
    pub mass: f64,
    pub matpc: MatPcType,
    pub dagger: DagType,
    pub precision: Precision,
    pub gauge: Option<Arc<GaugeField>>,
    pub fat_gauge: Option<Arc<GaugeField>>,
    pub long_gauge: Option<Arc<GaugeField>>,
    pub clover: Option<Arc<CloverField>>,
    pub clover_inv: Option<Arc<CloverField>>,
    /// Scratch buffers shared with other operators; a private pool otherwise.
    pub scratch: Option<Arc<ScratchPool>>,
    pub verbosity: Verbosity,
}

impl DiracParam {
    /// Primary-precision parameters for an inversion.
    ///
    /// Only the background fields the discretisation uses are passed on:
    /// the thin gauge field (and clover term) for Wilson types and naive
    /// staggered, fat and long links for asqtad.
    #[must_use]
    pub fn from_invert_param(inv: &InvertParam, fields: &BackgroundFields) -> Self {
        Self::translate(inv, fields, inv.precision)
    }

    /// Same operator at the sloppy precision used inside the solver.
    #[must_use]
    pub fn from_invert_param_sloppy(inv: &InvertParam, fields: &BackgroundFields) -> Self {
        Self::translate(inv, fields, inv.precision_sloppy)
    }

    fn translate(inv: &InvertParam, fields: &BackgroundFields, precision: Precision) -> Self {
        let pc = inv.solve_type.is_preconditioned();
        let dirac_type = match (inv.dslash_type, pc) {
            (DslashType::Wilson, false) => DiracType::Wilson,
            (DslashType::Wilson, true) => DiracType::WilsonPc,
            (DslashType::Clover, false) => DiracType::Clover,
            (DslashType::Clover, true) => DiracType::CloverPc,
            (DslashType::Staggered | DslashType::Asqtad, false) => DiracType::Staggered,
            (DslashType::Staggered | DslashType::Asqtad, true) => DiracType::StaggeredPc,
        };
        let param = Self {
            dirac_type,
            kappa: inv.kappa,
            mass: inv.mass,
            matpc: inv.matpc_type,
            dagger: inv.dagger,
            precision,
            verbosity: inv.verbosity,
            ..Self::default()
        };
        match inv.dslash_type {
            DslashType::Wilson | DslashType::Clover => Self {
                gauge: fields.gauge.clone(),
                clover: fields.clover.clone(),
                clover_inv: fields.clover_inv.clone(),
                ..param
            },
            DslashType::Staggered => Self {
                gauge: fields.gauge.clone(),
                ..param
            },
            DslashType::Asqtad => Self {
                fat_gauge: fields.fat_gauge.clone(),
                long_gauge: fields.long_gauge.clone(),
                ..param
            },
        }
    }
}
