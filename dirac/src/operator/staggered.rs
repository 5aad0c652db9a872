// SPDX-License-Identifier: AGPL-3.0-only

//! Staggered operators, naive or improved.
//!
//! `M = 2m + D` with the anti-Hermitian hopping term `D` of
//! [`crate::lattice::stencil::staggered_hop`]. Fat and long links select the
//! improved (asqtad) stencil; a thin gauge field alone selects the naive
//! one-hop stencil. The diagonal is a scalar, so
//! the even-odd reduction needs no inverse field:
//!
//! ```text
//! M_pc = 4m² − D_pō D_ōp          (Hermitian, positive definite)
//! src  = 2m b_p − D b_ō
//! x_ō  = (b_ō − D x_p) / 2m
//! ```
//!
//! The reduced operator is already normal, so `M_pc` equals its own dagger
//! and a solver may run CG on it directly.

use std::sync::Arc;

use super::check::{check_full_spinor, check_parity_spinor};
use super::param::{DagType, DiracParam, SolutionType};
use super::{
    check_pc_dslash, common_geometry, full_dslash, needs_reduction, prepare_full,
    reconstruct_full, require_link_kind, Dirac, DiracBase, PreparedSystem, Xpay,
};
use crate::error::{DiracError, DiracResult};
use crate::lattice::constants::{LATTICE_DIVISION_GUARD, STAGGERED_NSPIN};
use crate::lattice::gauge::{GaugeField, LinkKind};
use crate::lattice::geometry::{LatticeGeometry, Parity};
use crate::lattice::spinor::ColorSpinorField;
use crate::lattice::stencil;

#[derive(Clone, Debug)]
struct StaggeredHopping {
    /// Fat links, or thin links for the naive stencil.
    one_hop: Arc<GaugeField>,
    /// Naik links; `None` for the naive stencil.
    long: Option<Arc<GaugeField>>,
}

impl StaggeredHopping {
    fn new(param: &DiracParam) -> DiracResult<(Self, LatticeGeometry)> {
        match (&param.fat_gauge, &param.long_gauge) {
            (Some(fat), Some(long)) => {
                require_link_kind("fat link", fat, LinkKind::Fat)?;
                require_link_kind("long link", long, LinkKind::Long)?;
                let geometry = common_geometry(&[
                    ("fat link", Some(fat.geometry())),
                    ("long link", Some(long.geometry())),
                ])?;
                let hopping = Self {
                    one_hop: Arc::clone(fat),
                    long: Some(Arc::clone(long)),
                };
                Ok((hopping, geometry))
            }
            (None, None) => {
                let gauge = param.gauge.clone().ok_or_else(|| {
                    DiracError::unsupported(format!(
                        "{:?} needs fat and long links, or thin links for naive staggered",
                        param.dirac_type
                    ))
                })?;
                require_link_kind("gauge", &gauge, LinkKind::Thin)?;
                let geometry = *gauge.geometry();
                Ok((Self { one_hop: gauge, long: None }, geometry))
            }
            _ => Err(DiracError::unsupported(format!(
                "{:?} needs both fat and long links",
                param.dirac_type
            ))),
        }
    }

    const fn is_improved(&self) -> bool {
        self.long.is_some()
    }

    /// `out = ±coeff · D in (+ k·x)`, the sign flipping for the dagger.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        base: &DiracBase,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        coeff: f64,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        let flops = stencil::staggered_hop(
            out,
            &self.one_hop,
            self.long.as_deref(),
            input,
            parity,
            dagger.is_yes(),
            coeff,
            xpay,
        )?;
        base.add_flops(flops);
        Ok(())
    }
}

/// Unpreconditioned staggered operator on full fields.
#[derive(Clone, Debug)]
pub struct DiracStaggered {
    base: DiracBase,
    hopping: StaggeredHopping,
}

impl DiracStaggered {
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] without either fat and long links on one
    /// lattice or a thin gauge field, or for links tagged with the wrong role.
    pub fn new(param: &DiracParam) -> DiracResult<Self> {
        let (hopping, geometry) = StaggeredHopping::new(param)?;
        Ok(Self {
            base: DiracBase::new(param, geometry, STAGGERED_NSPIN),
            hopping,
        })
    }

    /// Whether the Naik term is applied.
    #[must_use]
    pub const fn is_improved(&self) -> bool {
        self.hopping.is_improved()
    }
}

impl Dirac for DiracStaggered {
    fn base(&self) -> &DiracBase {
        &self.base
    }

    fn is_preconditioned(&self) -> bool {
        false
    }

    fn apply_dslash(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        full_dslash(&self.base, out, input, parity, xpay, |o, i, x| {
            self.hopping.apply(&self.base, o, i, parity, dagger, 1.0, x)
        })
    }

    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()> {
        check_full_spinor(&self.base, out, input)?;
        let two_m = 2.0 * self.base.mass();
        for parity in [Parity::Even, Parity::Odd] {
            self.hopping.apply(
                &self.base,
                out.half_mut(parity)?,
                input.half(parity.other())?,
                parity,
                dagger,
                1.0,
                Some((input.half(parity)?, two_m)),
            )?;
        }
        Ok(())
    }

    fn prepare<'a>(
        &self,
        x: &'a mut ColorSpinorField,
        b: &'a ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<PreparedSystem<'a>> {
        prepare_full(&self.base, x, b, solution)
    }

    fn reconstruct(
        &self,
        x: &mut ColorSpinorField,
        b: &ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<()> {
        reconstruct_full(&self.base, x, b, solution)
    }
}

/// Even-odd preconditioned staggered operator on parity fields.
///
/// Symmetric and asymmetric matpc types give the same operator.
#[derive(Clone, Debug)]
pub struct DiracStaggeredPc {
    base: DiracBase,
    hopping: StaggeredHopping,
}

impl DiracStaggeredPc {
    /// # Errors
    ///
    /// As for [`DiracStaggered::new`], plus an invalid matpc type or zero
    /// mass (the eliminated parity cannot be rebuilt).
    pub fn new(param: &DiracParam) -> DiracResult<Self> {
        param.matpc.parity()?;
        if param.mass.abs() < LATTICE_DIVISION_GUARD {
            return Err(DiracError::unsupported(
                "preconditioned staggered operator needs a non-zero mass",
            ));
        }
        let (hopping, geometry) = StaggeredHopping::new(param)?;
        Ok(Self {
            base: DiracBase::new(param, geometry, STAGGERED_NSPIN),
            hopping,
        })
    }

    /// Whether the Naik term is applied.
    #[must_use]
    pub const fn is_improved(&self) -> bool {
        self.hopping.is_improved()
    }
}

impl Dirac for DiracStaggeredPc {
    fn base(&self) -> &DiracBase {
        &self.base
    }

    fn is_preconditioned(&self) -> bool {
        true
    }

    fn apply_dslash(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        check_pc_dslash(&self.base, out, input, xpay)?;
        self.hopping.apply(&self.base, out, input, parity, dagger, 1.0, xpay)
    }

    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()> {
        check_parity_spinor(&self.base, out, input)?;
        let (p, o) = self.base.parities()?;
        let mass = self.base.mass();
        let mut tmp = self.base.scratch().take_like(input);
        self.hopping.apply(&self.base, &mut tmp, input, o, dagger, 1.0, None)?;
        // 4m² in − D D in
        let diagonal = Some((input, 4.0 * mass * mass));
        self.hopping
            .apply(&self.base, out, &tmp, p, dagger, -1.0, diagonal)
    }

    fn prepare<'a>(
        &self,
        x: &'a mut ColorSpinorField,
        b: &'a ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<PreparedSystem<'a>> {
        if !needs_reduction(&self.base, x, b, solution)? {
            return Ok(PreparedSystem { src: b, sol: x });
        }
        let (p, o) = self.base.parities()?;
        let (x_p, x_o) = x.split_mut(p)?;
        // 2m b_p − D b_o
        self.hopping.apply(
            &self.base,
            x_o,
            b.half(o)?,
            p,
            self.base.dagger(),
            -1.0,
            Some((b.half(p)?, 2.0 * self.base.mass())),
        )?;
        Ok(PreparedSystem { src: x_o, sol: x_p })
    }

    fn reconstruct(
        &self,
        x: &mut ColorSpinorField,
        b: &ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<()> {
        if !needs_reduction(&self.base, x, b, solution)? {
            return Ok(());
        }
        let (p, o) = self.base.parities()?;
        let (x_p, x_o) = x.split_mut(p)?;
        self.hopping.apply(
            &self.base,
            x_o,
            x_p,
            o,
            self.base.dagger(),
            -1.0,
            Some((b.half(o)?, 1.0)),
        )?;
        x_o.scale(1.0 / (2.0 * self.base.mass()));
        self.base.add_blas_flops(x_o);
        Ok(())
    }
}
