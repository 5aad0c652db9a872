// SPDX-License-Identifier: AGPL-3.0-only

//! Clover-improved Wilson operators.
//!
//! `M = A + H` with the site-diagonal clover term A and the Wilson hopping
//! term `H = −κ D_W`. Even-odd reduction on the retained parity p:
//!
//! ```text
//! symmetric:   M_pc = 1 − A_pp⁻¹ H A_ōō⁻¹ H
//! asymmetric:  M_pc = A_pp − H A_ōō⁻¹ H
//! ```
//!
//! The preconditioned hopping term is `A⁻¹ H` (its dagger `H† A⁻¹`), so the
//! symmetric `M_pc` is `1 − Dslash Dslash`. Both forms need the inverse of
//! the clover term on the eliminated parity.

use std::sync::Arc;

use super::check::{check_full_spinor, check_parity_spinor};
use super::param::{DagType, DiracParam, SolutionType};
use super::wilson::WilsonHopping;
use super::{
    check_pc_dslash, common_geometry, full_dslash, needs_reduction, prepare_full,
    reconstruct_full, Dirac, DiracBase, PreparedSystem, Xpay,
};
use crate::error::{DiracError, DiracResult};
use crate::lattice::clover::CloverField;
use crate::lattice::constants::WILSON_NSPIN;
use crate::lattice::geometry::Parity;
use crate::lattice::spinor::ColorSpinorField;
use crate::lattice::stencil;

fn require(
    field: Option<&Arc<CloverField>>,
    what: &str,
    param: &DiracParam,
) -> DiracResult<Arc<CloverField>> {
    field
        .cloned()
        .ok_or_else(|| DiracError::unsupported(format!("{:?} needs a {what}", param.dirac_type)))
}

/// `out = A in` (or `A⁻¹ in`) on one parity, counted.
fn apply_clover(
    base: &DiracBase,
    clover: &CloverField,
    out: &mut ColorSpinorField,
    input: &ColorSpinorField,
    parity: Parity,
) -> DiracResult<()> {
    base.add_flops(stencil::clover_apply(out, clover, input, parity)?);
    Ok(())
}

/// Unpreconditioned clover operator on full fields.
#[derive(Clone, Debug)]
pub struct DiracClover {
    base: DiracBase,
    hopping: WilsonHopping,
    clover: Arc<CloverField>,
}

impl DiracClover {
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] without a gauge field or clover term, or
    /// when the two live on different lattices.
    pub fn new(param: &DiracParam) -> DiracResult<Self> {
        let hopping = WilsonHopping::new(param)?;
        let clover = require(param.clover.as_ref(), "clover term", param)?;
        let geometry = common_geometry(&[
            ("gauge", Some(hopping.gauge().geometry())),
            ("clover", Some(clover.geometry())),
        ])?;
        Ok(Self {
            base: DiracBase::new(param, geometry, WILSON_NSPIN),
            hopping,
            clover,
        })
    }

    /// `out = A in` on a single parity.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] unless both fields are parity fields
    /// matching the operator.
    pub fn clover(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
    ) -> DiracResult<()> {
        check_parity_spinor(&self.base, out, input)?;
        apply_clover(&self.base, &self.clover, out, input, parity)
    }
}

impl Dirac for DiracClover {
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
        // A is Hermitian, so the dagger only reaches the hopping term.
        for parity in [Parity::Even, Parity::Odd] {
            let in_p = input.half(parity)?;
            let mut a_in = self.base.scratch().take_like(in_p);
            apply_clover(&self.base, &self.clover, &mut a_in, in_p, parity)?;
            self.hopping.dslash(
                &self.base,
                out.half_mut(parity)?,
                input.half(parity.other())?,
                parity,
                dagger,
                Some((&*a_in, 1.0)),
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

/// Even-odd preconditioned clover operator on parity fields.
#[derive(Clone, Debug)]
pub struct DiracCloverPc {
    base: DiracBase,
    hopping: WilsonHopping,
    clover: Arc<CloverField>,
    clover_inv: Arc<CloverField>,
}

impl DiracCloverPc {
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] without a gauge field, clover term, clover
    /// inverse or valid matpc type, or when they live on different lattices.
    pub fn new(param: &DiracParam) -> DiracResult<Self> {
        param.matpc.parity()?;
        let hopping = WilsonHopping::new(param)?;
        let clover = require(param.clover.as_ref(), "clover term", param)?;
        let clover_inv = require(param.clover_inv.as_ref(), "clover inverse", param)?;
        let geometry = common_geometry(&[
            ("gauge", Some(hopping.gauge().geometry())),
            ("clover", Some(clover.geometry())),
            ("clover inverse", Some(clover_inv.geometry())),
        ])?;
        Ok(Self {
            base: DiracBase::new(param, geometry, WILSON_NSPIN),
            hopping,
            clover,
            clover_inv,
        })
    }

    /// `out = A⁻¹ in` on a single parity.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] unless both fields are parity fields
    /// matching the operator.
    pub fn clover_inv(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
    ) -> DiracResult<()> {
        check_parity_spinor(&self.base, out, input)?;
        apply_clover(&self.base, &self.clover_inv, out, input, parity)
    }

    fn is_asymmetric(&self) -> bool {
        self.base.matpc().is_asymmetric()
    }

    /// `A⁻¹ H in`, or `H† A⁻¹ in` for the dagger, plus `k·x`.
    fn pc_dslash(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        let mut tmp = self.base.scratch().take_like(input);
        if dagger.is_yes() {
            apply_clover(&self.base, &self.clover_inv, &mut tmp, input, parity.other())?;
            self.hopping.dslash(&self.base, out, &tmp, parity, dagger, xpay)
        } else {
            self.hopping.dslash(&self.base, &mut tmp, input, parity, dagger, None)?;
            apply_clover(&self.base, &self.clover_inv, out, &tmp, parity)?;
            if let Some((x, k)) = xpay {
                out.axpy(k, x);
                self.base.add_blas_flops(out);
            }
            Ok(())
        }
    }
}

impl Dirac for DiracCloverPc {
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
        self.pc_dslash(out, input, parity, dagger, xpay)
    }

    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()> {
        check_parity_spinor(&self.base, out, input)?;
        let (p, o) = self.base.parities()?;
        let scratch = self.base.scratch();
        if self.is_asymmetric() {
            // A_pp in − H A_oo⁻¹ H in
            let mut h_in = scratch.take_like(input);
            let mut a_inv_h_in = scratch.take_like(input);
            let mut a_in = scratch.take_like(input);
            self.hopping.dslash(&self.base, &mut h_in, input, o, dagger, None)?;
            apply_clover(&self.base, &self.clover_inv, &mut a_inv_h_in, &h_in, o)?;
            apply_clover(&self.base, &self.clover, &mut a_in, input, p)?;
            let kappa = self.base.kappa();
            self.hopping
                .apply(&self.base, out, &a_inv_h_in, p, dagger, kappa, Some((&*a_in, 1.0)))
        } else {
            let mut tmp = scratch.take_like(input);
            self.pc_dslash(&mut tmp, input, o, dagger, None)?;
            self.pc_dslash(out, &tmp, p, dagger, None)?;
            out.xpay(input, -1.0);
            self.base.add_blas_flops(out);
            Ok(())
        }
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
        let dagger = self.base.dagger();
        let kappa = self.base.kappa();
        let scratch = self.base.scratch();
        let (x_p, x_o) = x.split_mut(p)?;

        let b_o = b.half(o)?;
        let mut a_inv_b = scratch.take_like(b_o);
        apply_clover(&self.base, &self.clover_inv, &mut a_inv_b, b_o, o)?;

        // b_p − H A_oo⁻¹ b_o; the symmetric form also divides by A_pp, except
        // for the dagger, whose A_pp⁻¹ acts on the solution in reconstruct.
        let src = (b.half(p)?, 1.0);
        if self.is_asymmetric() || dagger.is_yes() {
            self.hopping
                .apply(&self.base, x_o, &a_inv_b, p, dagger, kappa, Some(src))?;
        } else {
            let mut t = scratch.take_like(b_o);
            self.hopping
                .apply(&self.base, &mut t, &a_inv_b, p, dagger, kappa, Some(src))?;
            apply_clover(&self.base, &self.clover_inv, x_o, &t, p)?;
        }
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
        let dagger = self.base.dagger();
        let scratch = self.base.scratch();
        let (x_p, x_o) = x.split_mut(p)?;

        if !self.is_asymmetric() && dagger.is_yes() {
            let mut y = scratch.take_like(x_p);
            y.copy_from(x_p);
            apply_clover(&self.base, &self.clover_inv, x_p, &y, p)?;
        }
        // x_o = A_oo⁻¹ (b_o − H x_p)
        let mut t = scratch.take_like(x_o);
        let kappa = self.base.kappa();
        self.hopping
            .apply(&self.base, &mut t, x_p, o, dagger, kappa, Some((b.half(o)?, 1.0)))?;
        apply_clover(&self.base, &self.clover_inv, x_o, &t, o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::gauge::{GaugeField, LinkKind};
    use crate::lattice::geometry::LatticeGeometry;
    use crate::lattice::spinor::{Precision, SiteSubset};
    use crate::operator::param::{DiracType, MatPcType};
    use crate::tolerances::OPERATOR_IDENTITY_ABS;

    fn param(dirac_type: DiracType, matpc: MatPcType) -> DiracParam {
        let g = LatticeGeometry::new([2, 2, 4, 4]).unwrap();
        let clover = CloverField::random(g, 0.05, 31);
        let clover_inv = clover.inverse().unwrap();
        DiracParam {
            dirac_type,
            kappa: 0.1,
            matpc,
            dagger: DagType::No,
            gauge: Some(Arc::new(GaugeField::hot_start(g, LinkKind::Thin, 0.4, 30))),
            clover: Some(Arc::new(clover)),
            clover_inv: Some(Arc::new(clover_inv)),
            ..DiracParam::default()
        }
    }

    #[test]
    fn missing_inverse_is_unsupported() {
        let p = DiracParam {
            clover_inv: None,
            ..param(DiracType::CloverPc, MatPcType::EvenEven)
        };
        assert!(matches!(DiracCloverPc::new(&p), Err(DiracError::Unsupported(_))));
    }

    #[test]
    fn identity_clover_matches_wilson() {
        let mut p = param(DiracType::Clover, MatPcType::EvenEven);
        let g = *p.gauge.as_ref().unwrap().geometry();
        p.clover = Some(Arc::new(CloverField::identity(g)));
        let clover = DiracClover::new(&p).unwrap();
        let wilson = super::super::DiracWilson::new(&p).unwrap();
        let v = ColorSpinorField::random(g, 4, SiteSubset::Full, Precision::Double, 8);
        let mut a = v.zeros_like();
        let mut b = v.zeros_like();
        clover.m(&mut a, &v).unwrap();
        wilson.m(&mut b, &v).unwrap();
        assert!(a.max_abs_diff(&b) < OPERATOR_IDENTITY_ABS);
    }

    #[test]
    fn clover_then_inverse_is_identity() {
        let p = param(DiracType::CloverPc, MatPcType::OddOdd);
        let op = DiracCloverPc::new(&p).unwrap();
        let full = DiracClover::new(&p).unwrap();
        let v = ColorSpinorField::random(
            *op.geometry(),
            4,
            SiteSubset::Parity,
            Precision::Double,
            3,
        );
        let mut a = v.zeros_like();
        let mut back = v.zeros_like();
        full.clover(&mut a, &v, Parity::Odd).unwrap();
        op.clover_inv(&mut back, &a, Parity::Odd).unwrap();
        assert!(back.max_abs_diff(&v) < OPERATOR_IDENTITY_ABS);
    }

    #[test]
    fn symmetric_m_is_one_minus_dslash_squared() {
        let op = DiracCloverPc::new(&param(DiracType::CloverPc, MatPcType::EvenEven)).unwrap();
        let v = ColorSpinorField::random(
            *op.geometry(),
            4,
            SiteSubset::Parity,
            Precision::Double,
            4,
        );
        let mut m = v.zeros_like();
        op.m(&mut m, &v).unwrap();
        let mut t = v.zeros_like();
        let mut expected = v.zeros_like();
        op.dslash(&mut t, &v, Parity::Odd).unwrap();
        op.dslash_xpay(&mut expected, &t, Parity::Even, &v, -1.0).unwrap();
        expected.scale(-1.0);
        assert!(m.max_abs_diff(&expected) < OPERATOR_IDENTITY_ABS);
    }
}
