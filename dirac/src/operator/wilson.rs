// SPDX-License-Identifier: AGPL-3.0-only

//! Wilson fermion operators.
//!
//! `M = 1 + H` with hopping term `H = −κ D_W` (see [`crate::lattice::stencil`]
//! for `D_W`). The even-odd reduced operator on the retained parity p is
//!
//! ```text
//! M_pc = 1 − H_pō H_ōp
//! ```
//!
//! and a full system `M x = b` reduces to `M_pc x_p = b_p − H b_ō`, with
//! `x_ō = b_ō − H x_p` rebuilding the eliminated parity.

use std::sync::Arc;

use super::check::{check_full_spinor, check_parity_spinor};
use super::param::{DagType, DiracParam, SolutionType};
use super::{
    check_pc_dslash, common_geometry, full_dslash, needs_reduction, prepare_full,
    reconstruct_full, require_link_kind, Dirac, DiracBase, PreparedSystem, Xpay,
};
use crate::error::{DiracError, DiracResult};
use crate::lattice::constants::WILSON_NSPIN;
use crate::lattice::gauge::{GaugeField, LinkKind};
use crate::lattice::geometry::Parity;
use crate::lattice::spinor::ColorSpinorField;
use crate::lattice::stencil;

/// Wilson hopping term shared by the Wilson and clover operators.
#[derive(Clone, Debug)]
pub(crate) struct WilsonHopping {
    gauge: Arc<GaugeField>,
}

impl WilsonHopping {
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] without a gauge field of thin links.
    pub(crate) fn new(param: &DiracParam) -> DiracResult<Self> {
        let gauge = param.gauge.clone().ok_or_else(|| {
            DiracError::unsupported(format!("{:?} needs a gauge field", param.dirac_type))
        })?;
        require_link_kind("gauge", &gauge, LinkKind::Thin)?;
        Ok(Self { gauge })
    }

    pub(crate) fn gauge(&self) -> &GaugeField {
        &self.gauge
    }

    /// `out = coeff · D_W in (+ k·x)` on parity fields.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn apply(
        &self,
        base: &DiracBase,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        coeff: f64,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        let flops =
            stencil::wilson_hop(out, &self.gauge, input, parity, dagger.is_yes(), coeff, xpay)?;
        base.add_flops(flops);
        Ok(())
    }

    /// `out = H in (+ k·x)` on parity fields.
    pub(crate) fn dslash(
        &self,
        base: &DiracBase,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        self.apply(base, out, input, parity, dagger, -base.kappa(), xpay)
    }
}

/// Unpreconditioned Wilson operator on full fields.
#[derive(Clone, Debug)]
pub struct DiracWilson {
    base: DiracBase,
    hopping: WilsonHopping,
}

impl DiracWilson {
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] without a gauge field.
    pub fn new(param: &DiracParam) -> DiracResult<Self> {
        let hopping = WilsonHopping::new(param)?;
        let geometry = common_geometry(&[("gauge", Some(hopping.gauge().geometry()))])?;
        Ok(Self {
            base: DiracBase::new(param, geometry, WILSON_NSPIN),
            hopping,
        })
    }
}

impl Dirac for DiracWilson {
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
            self.hopping.dslash(&self.base, o, i, parity, dagger, x)
        })
    }

    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()> {
        check_full_spinor(&self.base, out, input)?;
        for parity in [Parity::Even, Parity::Odd] {
            self.hopping.dslash(
                &self.base,
                out.half_mut(parity)?,
                input.half(parity.other())?,
                parity,
                dagger,
                Some((input.half(parity)?, 1.0)),
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

/// Even-odd preconditioned Wilson operator on parity fields.
///
/// Symmetric and asymmetric matpc types give the same operator.
#[derive(Clone, Debug)]
pub struct DiracWilsonPc {
    base: DiracBase,
    hopping: WilsonHopping,
}

impl DiracWilsonPc {
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] without a gauge field or a valid matpc type.
    pub fn new(param: &DiracParam) -> DiracResult<Self> {
        param.matpc.parity()?;
        let hopping = WilsonHopping::new(param)?;
        let geometry = common_geometry(&[("gauge", Some(hopping.gauge().geometry()))])?;
        Ok(Self {
            base: DiracBase::new(param, geometry, WILSON_NSPIN),
            hopping,
        })
    }
}

impl Dirac for DiracWilsonPc {
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
        self.hopping.dslash(&self.base, out, input, parity, dagger, xpay)
    }

    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()> {
        check_parity_spinor(&self.base, out, input)?;
        let (p, o) = self.base.parities()?;
        let mut tmp = self.base.scratch().take_like(input);
        self.hopping.dslash(&self.base, &mut tmp, input, o, dagger, None)?;
        // in − H tmp
        let kappa = self.base.kappa();
        self.hopping
            .apply(&self.base, out, &tmp, p, dagger, kappa, Some((input, 1.0)))
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
        // b_p − H b_o, stored in the eliminated half of x
        self.hopping.apply(
            &self.base,
            x_o,
            b.half(o)?,
            p,
            self.base.dagger(),
            self.base.kappa(),
            Some((b.half(p)?, 1.0)),
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
        // x_o = b_o − H x_p
        self.hopping.apply(
            &self.base,
            x_o,
            x_p,
            o,
            self.base.dagger(),
            self.base.kappa(),
            Some((b.half(o)?, 1.0)),
        )
    }
}
