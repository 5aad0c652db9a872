// SPDX-License-Identifier: AGPL-3.0-only

//! Matrix-free Dirac operators.
//!
//! [`Dirac`] is the contract every discretisation fulfils: the hopping term
//! (`dslash`, `dslash_xpay`), the full matrix (`m`, `mdag`, `mdag_m`), the
//! even-odd reduction of a full system (`prepare`, `reconstruct`) and flop
//! accounting. Concrete variants only implement the dagger-explicit kernels
//! `apply_dslash` and `apply_m` plus the reduction; everything else is a
//! provided method.
//!
//! The dagger convention of an operator is fixed at construction. `mdag`
//! passes the flipped convention down the call chain instead of toggling
//! state, so no call ever changes what `dagger()` reports and a shared
//! operator can serve several threads at once.
//!
//! | Variant | Fields | `M` |
//! |---------|--------|-----|
//! | [`DiracWilson`] | full | `1 + H` |
//! | [`DiracWilsonPc`] | parity | `1 − H H` |
//! | [`DiracClover`] | full | `A + H` |
//! | [`DiracCloverPc`] | parity | `1 − A⁻¹H A⁻¹H` or `A − H A⁻¹ H` |
//! | [`DiracStaggered`] | full | `2m + D` |
//! | [`DiracStaggeredPc`] | parity | `4m² − D D` |
//!
//! with `H = −κ D_W`.

pub mod check;
pub mod clover;
pub mod matrix;
pub mod param;
pub mod staggered;
pub mod wilson;
pub mod workspace;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

pub use clover::{DiracClover, DiracCloverPc};
pub use matrix::{DiracM, DiracMatrix, DiracMdag, DiracMdagM};
pub use param::{
    DagType, DiracParam, DiracType, DslashType, MatPcType, SolutionType, SolveType, Verbosity,
};
pub use staggered::{DiracStaggered, DiracStaggeredPc};
pub use wilson::{DiracWilson, DiracWilsonPc};
pub use workspace::{Scratch, ScratchPool};

use crate::error::{DiracError, DiracResult};
use crate::lattice::constants::XPAY_FLOPS_PER_COMPONENT;
use crate::lattice::gauge::{GaugeField, LinkKind};
use crate::lattice::geometry::{LatticeGeometry, Parity};
use crate::lattice::spinor::{ColorSpinorField, Precision, SiteSubset};

/// Optional fused accumulation `+ k·x`.
pub type Xpay<'a> = Option<(&'a ColorSpinorField, f64)>;

/// Accumulated floating-point operation count.
///
/// Reads are take-and-reset. Two threads reading at once split the count
/// between them; nothing is lost or counted twice.
#[derive(Debug, Default)]
pub struct FlopCounter(AtomicU64);

impl FlopCounter {
    pub fn add(&self, flops: u64) {
        self.0.fetch_add(flops, Ordering::Relaxed);
    }

    /// Return the count and zero it.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

impl Clone for FlopCounter {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.0.load(Ordering::Relaxed)))
    }
}

/// State shared by every variant: scalars, lattice, counters, scratch.
#[derive(Clone, Debug)]
pub struct DiracBase {
    kappa: f64,
    mass: f64,
    matpc: MatPcType,
    dagger: DagType,
    precision: Precision,
    verbosity: Verbosity,
    geometry: LatticeGeometry,
    nspin: usize,
    flops: FlopCounter,
    scratch: Arc<ScratchPool>,
}

impl DiracBase {
    pub(crate) fn new(param: &DiracParam, geometry: LatticeGeometry, nspin: usize) -> Self {
        Self {
            kappa: param.kappa,
            mass: param.mass,
            matpc: param.matpc,
            dagger: param.dagger,
            precision: param.precision,
            verbosity: param.verbosity,
            geometry,
            nspin,
            flops: FlopCounter::default(),
            scratch: param.scratch.clone().unwrap_or_default(),
        }
    }

    #[must_use]
    pub const fn kappa(&self) -> f64 {
        self.kappa
    }

    #[must_use]
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    #[must_use]
    pub const fn matpc(&self) -> MatPcType {
        self.matpc
    }

    #[must_use]
    pub const fn dagger(&self) -> DagType {
        self.dagger
    }

    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[must_use]
    pub const fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    #[must_use]
    pub const fn nspin(&self) -> usize {
        self.nspin
    }

    #[must_use]
    pub fn scratch(&self) -> &ScratchPool {
        &self.scratch
    }

    pub fn add_flops(&self, flops: u64) {
        self.flops.add(flops);
    }

    /// Retained and eliminated parities of the even-odd reduction.
    pub(crate) fn parities(&self) -> DiracResult<(Parity, Parity)> {
        let p = self.matpc.parity()?;
        Ok((p, p.other()))
    }

    /// Flops of one `axpy`/`xpay` sweep over `field`.
    pub(crate) fn add_blas_flops(&self, field: &ColorSpinorField) {
        self.add_flops(XPAY_FLOPS_PER_COMPONENT * (field.sites() * field.site_len()) as u64);
    }
}

/// The fields a solver works on after [`Dirac::prepare`].
///
/// For an even-odd reduction of a full system, `sol` is the retained-parity
/// half of `x` and `src` is the other half of `x`, overwritten with the
/// reduced source.
#[derive(Debug)]
pub struct PreparedSystem<'a> {
    pub src: &'a ColorSpinorField,
    pub sol: &'a mut ColorSpinorField,
}

/// A discretised Dirac operator.
pub trait Dirac: Send + Sync {
    fn base(&self) -> &DiracBase;

    /// Whether the operator acts on a single checkerboard.
    fn is_preconditioned(&self) -> bool;

    /// Hopping term with an explicit dagger convention.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if any field does not fit the operator.
    fn apply_dslash(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        xpay: Xpay<'_>,
    ) -> DiracResult<()>;

    /// Full matrix with an explicit dagger convention.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if either field does not fit the operator.
    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()>;

    /// Reduce `M x = b` to the system the solver should see.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] for ill-shaped fields,
    /// [`DiracError::Unsupported`] for a solution type the operator cannot
    /// reduce.
    fn prepare<'a>(
        &self,
        x: &'a mut ColorSpinorField,
        b: &'a ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<PreparedSystem<'a>>;

    /// Recover the full solution after the reduced solve.
    ///
    /// # Errors
    ///
    /// As for [`Dirac::prepare`].
    fn reconstruct(
        &self,
        x: &mut ColorSpinorField,
        b: &ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<()>;

    fn kappa(&self) -> f64 {
        self.base().kappa()
    }

    fn mass(&self) -> f64 {
        self.base().mass()
    }

    fn matpc(&self) -> MatPcType {
        self.base().matpc()
    }

    fn dagger(&self) -> DagType {
        self.base().dagger()
    }

    fn precision(&self) -> Precision {
        self.base().precision()
    }

    fn verbosity(&self) -> Verbosity {
        self.base().verbosity()
    }

    fn geometry(&self) -> &LatticeGeometry {
        self.base().geometry()
    }

    /// Spin components per site: 4 for Wilson-type, 1 for staggered.
    fn nspin(&self) -> usize {
        self.base().nspin()
    }

    /// Site subset of the fields `m` and `dslash` act on.
    fn subset(&self) -> SiteSubset {
        if self.is_preconditioned() {
            SiteSubset::Parity
        } else {
            SiteSubset::Full
        }
    }

    /// Zero field of the shape `m` accepts.
    fn create_spinor(&self) -> ColorSpinorField {
        ColorSpinorField::zeros(*self.geometry(), self.nspin(), self.subset(), self.precision())
    }

    /// Flops since the last call; resets the counter.
    ///
    /// Concurrent readers race: each accumulated flop is returned to exactly
    /// one of them.
    fn flops(&self) -> u64 {
        self.base().flops.take()
    }

    /// Validate `out`/`in` for this operator's preconditioning class.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] naming the offending field.
    fn check_spinor(&self, out: &ColorSpinorField, input: &ColorSpinorField) -> DiracResult<()> {
        if self.is_preconditioned() {
            check::check_parity_spinor(self.base(), out, input)
        } else {
            check::check_full_spinor(self.base(), out, input)
        }
    }

    /// Hopping term onto `parity` from the opposite parity of `input`.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if either field does not fit the operator.
    fn dslash(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
    ) -> DiracResult<()> {
        self.apply_dslash(out, input, parity, self.dagger(), None)
    }

    /// `out = Dslash(in) + k·x` in one sweep.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if any field does not fit the operator.
    fn dslash_xpay(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        x: &ColorSpinorField,
        k: f64,
    ) -> DiracResult<()> {
        self.apply_dslash(out, input, parity, self.dagger(), Some((x, k)))
    }

    /// `out = M in`
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if either field does not fit the operator.
    fn m(&self, out: &mut ColorSpinorField, input: &ColorSpinorField) -> DiracResult<()> {
        self.apply_m(out, input, self.dagger())
    }

    /// `out = M† in`
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if either field does not fit the operator.
    fn mdag(&self, out: &mut ColorSpinorField, input: &ColorSpinorField) -> DiracResult<()> {
        self.apply_m(out, input, self.dagger().flip())
    }

    /// `out = M† M in`
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] if either field does not fit the operator.
    fn mdag_m(&self, out: &mut ColorSpinorField, input: &ColorSpinorField) -> DiracResult<()> {
        self.check_spinor(out, input)?;
        let dagger = self.dagger();
        let mut tmp = self.base().scratch().take_like(input);
        self.apply_m(&mut tmp, input, dagger)?;
        self.apply_m(out, &tmp, dagger.flip())
    }
}

/// Hopping term of an unpreconditioned operator: the `parity` half of `out`
/// from the opposite half of `input`, plus `k` times the `parity` half of `x`.
pub(crate) fn full_dslash(
    base: &DiracBase,
    out: &mut ColorSpinorField,
    input: &ColorSpinorField,
    parity: Parity,
    xpay: Xpay<'_>,
    kernel: impl FnOnce(&mut ColorSpinorField, &ColorSpinorField, Xpay<'_>) -> DiracResult<()>,
) -> DiracResult<()> {
    check::check_full_spinor(base, out, input)?;
    if let Some((x, _)) = xpay {
        check::check_xpay_spinor(base, SiteSubset::Full, x)?;
    }
    let x_half = xpay
        .map(|(x, k)| x.half(parity).map(|h| (h, k)))
        .transpose()?;
    kernel(out.half_mut(parity)?, input.half(parity.other())?, x_half)
}

/// Checks shared by every preconditioned hopping entry point.
pub(crate) fn check_pc_dslash(
    base: &DiracBase,
    out: &ColorSpinorField,
    input: &ColorSpinorField,
    xpay: Xpay<'_>,
) -> DiracResult<()> {
    check::check_parity_spinor(base, out, input)?;
    if let Some((x, _)) = xpay {
        check::check_xpay_spinor(base, SiteSubset::Parity, x)?;
    }
    Ok(())
}

/// Solution types an unpreconditioned operator handles as the identity.
pub(crate) fn prepare_full<'a>(
    base: &DiracBase,
    x: &'a mut ColorSpinorField,
    b: &'a ColorSpinorField,
    solution: SolutionType,
) -> DiracResult<PreparedSystem<'a>> {
    match solution {
        SolutionType::Mat | SolutionType::MatDagMat => {
            check::check_full_spinor(base, x, b)?;
            Ok(PreparedSystem { src: b, sol: x })
        }
        SolutionType::MatPc | SolutionType::MatPcDagMatPc => Err(DiracError::unsupported(
            format!("{solution:?} solution needs a preconditioned operator"),
        )),
    }
}

pub(crate) fn reconstruct_full(
    base: &DiracBase,
    x: &ColorSpinorField,
    b: &ColorSpinorField,
    solution: SolutionType,
) -> DiracResult<()> {
    match solution {
        SolutionType::Mat | SolutionType::MatDagMat => check::check_full_spinor(base, x, b),
        SolutionType::MatPc | SolutionType::MatPcDagMatPc => Err(DiracError::unsupported(
            format!("{solution:?} solution needs a preconditioned operator"),
        )),
    }
}

/// Whether a preconditioned operator must reduce (or rebuild) a full system.
///
/// Reduced solution types pass through unchanged on parity fields; a full
/// `Mat` solution needs the Schur reduction on full fields.
pub(crate) fn needs_reduction(
    base: &DiracBase,
    x: &ColorSpinorField,
    b: &ColorSpinorField,
    solution: SolutionType,
) -> DiracResult<bool> {
    match solution {
        SolutionType::MatPc | SolutionType::MatPcDagMatPc => {
            check::check_parity_spinor(base, x, b)?;
            Ok(false)
        }
        SolutionType::Mat => {
            check::check_full_spinor(base, x, b)?;
            Ok(true)
        }
        SolutionType::MatDagMat => Err(DiracError::unsupported(
            "mat_dag_mat solution cannot be reduced to a single parity",
        )),
    }
}

/// Closed set of operator variants produced by the factory.
#[derive(Clone, Debug)]
pub enum DiracOperator {
    Wilson(DiracWilson),
    WilsonPc(DiracWilsonPc),
    Clover(DiracClover),
    CloverPc(DiracCloverPc),
    Staggered(DiracStaggered),
    StaggeredPc(DiracStaggeredPc),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $body:expr) => {
        match $self {
            DiracOperator::Wilson($d) => $body,
            DiracOperator::WilsonPc($d) => $body,
            DiracOperator::Clover($d) => $body,
            DiracOperator::CloverPc($d) => $body,
            DiracOperator::Staggered($d) => $body,
            DiracOperator::StaggeredPc($d) => $body,
        }
    };
}

impl DiracOperator {
    /// Build the operator described by `param`.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] for an invalid type, matpc or dagger tag,
    /// a missing or inconsistent background field (including a link field
    /// tagged with the wrong [`LinkKind`]), or a staggered
    /// preconditioned operator with zero mass.
    pub fn create(param: &DiracParam) -> DiracResult<Self> {
        if param.dagger == DagType::Invalid {
            return Err(DiracError::unsupported("invalid dagger type"));
        }
        if param.dirac_type.is_preconditioned() && param.matpc == MatPcType::Invalid {
            return Err(DiracError::unsupported(format!(
                "{:?} needs a matpc type",
                param.dirac_type
            )));
        }
        let op = match param.dirac_type {
            DiracType::Invalid => return Err(DiracError::unsupported("invalid dirac type")),
            DiracType::Wilson => Self::Wilson(DiracWilson::new(param)?),
            DiracType::WilsonPc => Self::WilsonPc(DiracWilsonPc::new(param)?),
            DiracType::Clover => Self::Clover(DiracClover::new(param)?),
            DiracType::CloverPc => Self::CloverPc(DiracCloverPc::new(param)?),
            DiracType::Staggered => Self::Staggered(DiracStaggered::new(param)?),
            DiracType::StaggeredPc => Self::StaggeredPc(DiracStaggeredPc::new(param)?),
        };
        debug!(
            "created {:?} operator on {} (kappa={}, mass={}, matpc={:?}, dagger={:?})",
            param.dirac_type,
            op.geometry(),
            param.kappa,
            param.mass,
            param.matpc,
            param.dagger
        );
        Ok(op)
    }

    #[must_use]
    pub const fn dirac_type(&self) -> DiracType {
        match self {
            Self::Wilson(_) => DiracType::Wilson,
            Self::WilsonPc(_) => DiracType::WilsonPc,
            Self::Clover(_) => DiracType::Clover,
            Self::CloverPc(_) => DiracType::CloverPc,
            Self::Staggered(_) => DiracType::Staggered,
            Self::StaggeredPc(_) => DiracType::StaggeredPc,
        }
    }
}

impl Dirac for DiracOperator {
    fn base(&self) -> &DiracBase {
        dispatch!(self, d => d.base())
    }

    fn is_preconditioned(&self) -> bool {
        dispatch!(self, d => d.is_preconditioned())
    }

    fn apply_dslash(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        parity: Parity,
        dagger: DagType,
        xpay: Xpay<'_>,
    ) -> DiracResult<()> {
        dispatch!(self, d => d.apply_dslash(out, input, parity, dagger, xpay))
    }

    fn apply_m(
        &self,
        out: &mut ColorSpinorField,
        input: &ColorSpinorField,
        dagger: DagType,
    ) -> DiracResult<()> {
        dispatch!(self, d => d.apply_m(out, input, dagger))
    }

    fn prepare<'a>(
        &self,
        x: &'a mut ColorSpinorField,
        b: &'a ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<PreparedSystem<'a>> {
        dispatch!(self, d => d.prepare(x, b, solution))
    }

    fn reconstruct(
        &self,
        x: &mut ColorSpinorField,
        b: &ColorSpinorField,
        solution: SolutionType,
    ) -> DiracResult<()> {
        dispatch!(self, d => d.reconstruct(x, b, solution))
    }
}

/// A link field must be tagged with the role the operator gives it.
pub(crate) fn require_link_kind(
    name: &'static str,
    field: &GaugeField,
    kind: LinkKind,
) -> DiracResult<()> {
    if field.kind() == kind {
        return Ok(());
    }
    Err(DiracError::unsupported(format!(
        "{name} field holds {:?} links, expected {kind:?}",
        field.kind()
    )))
}

/// Geometry shared by all background fields of an operator.
pub(crate) fn common_geometry(
    fields: &[(&'static str, Option<&LatticeGeometry>)],
) -> DiracResult<LatticeGeometry> {
    let mut found: Option<(&'static str, LatticeGeometry)> = None;
    for &(name, geometry) in fields {
        let Some(g) = geometry else {
            return Err(DiracError::unsupported(format!("{name} field missing")));
        };
        match found {
            None => found = Some((name, *g)),
            Some((first, expected)) if expected != *g => {
                return Err(DiracError::unsupported(format!(
                    "{name} field is {g} but {first} field is {expected}"
                )));
            }
            Some(_) => {}
        }
    }
    found
        .map(|(_, g)| g)
        .ok_or_else(|| DiracError::unsupported("no background field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flop_counter_take_resets() {
        let c = FlopCounter::default();
        c.add(10);
        c.add(5);
        let copy = c.clone();
        assert_eq!(c.take(), 15);
        assert_eq!(c.take(), 0);
        assert_eq!(copy.take(), 15);
    }

    #[test]
    fn invalid_tags_are_rejected() {
        let mut param = DiracParam {
            dagger: DagType::No,
            ..DiracParam::default()
        };
        assert!(matches!(DiracOperator::create(&param), Err(DiracError::Unsupported(_))));
        param.dirac_type = DiracType::WilsonPc;
        assert!(matches!(DiracOperator::create(&param), Err(DiracError::Unsupported(_))));
        param.dagger = DagType::Invalid;
        param.dirac_type = DiracType::Wilson;
        assert!(matches!(DiracOperator::create(&param), Err(DiracError::Unsupported(_))));
    }

    #[test]
    fn mismatched_backgrounds_are_rejected() {
        let a = LatticeGeometry::new([2, 2, 2, 2]).unwrap();
        let b = LatticeGeometry::new([2, 2, 2, 4]).unwrap();
        assert!(common_geometry(&[("gauge", Some(&a)), ("clover", Some(&a))]).is_ok());
        assert!(common_geometry(&[("gauge", Some(&a)), ("clover", Some(&b))]).is_err());
        assert!(common_geometry(&[("gauge", Some(&a)), ("clover", None)]).is_err());
    }
}
