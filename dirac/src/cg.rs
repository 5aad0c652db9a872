// SPDX-License-Identifier: AGPL-3.0-only

//! Conjugate Gradient for Hermitian positive-definite operators.
//!
//! Written once against [`DiracMatrix`]: wrap an operator in [`DiracMdagM`]
//! for the normal equations, or in [`DiracM`] when `M` is itself Hermitian
//! positive definite (the preconditioned staggered operator).
//!
//! # Algorithm
//!
//! Standard CG with relative residual convergence criterion:
//!   ||r||² / ||b||² < tol²
//!
//! [`cg_multishift`] solves `(A + σ_i) x_i = b` for several shifts at the
//! cost of one Krylov space: the shifted residuals stay collinear with the
//! base residual, `r_i = ζ_i r`, so only the base system applies `A`.
//!
//! # References
//!
//! - Hestenes & Stiefel (1952), original CG
//! - Gattringer & Lang, "QCD on the Lattice" (2010), Ch. 8.4
//! - Jegerlehner, "Krylov space solvers for shifted linear systems" (1996)
//!
//! [`DiracMdagM`]: crate::operator::DiracMdagM
//! [`DiracM`]: crate::operator::DiracM

use log::trace;

use crate::error::{DiracError, DiracResult};
use crate::lattice::constants::LATTICE_DIVISION_GUARD;
use crate::lattice::spinor::ColorSpinorField;
use crate::operator::DiracMatrix;

/// CG solver result.
#[derive(Clone, Debug)]
pub struct CgResult {
    pub converged: bool,
    pub iterations: usize,
    pub final_residual: f64,
    pub initial_residual: f64,
    /// Operator flops since the counter was last read, the solve included.
    pub flops: u64,
}

/// Solve `A x = b` for the operator wrapped by `matrix`.
///
/// `x` holds the initial guess and receives the solution. `tol` is the
/// relative residual target.
///
/// # Errors
///
/// Any field mismatch reported by the operator.
pub fn cg_solve<A: DiracMatrix + ?Sized>(
    matrix: &A,
    x: &mut ColorSpinorField,
    b: &ColorSpinorField,
    tol: f64,
    max_iter: usize,
) -> DiracResult<CgResult> {
    let b_norm_sq = b.norm_sq();
    if b_norm_sq < LATTICE_DIVISION_GUARD {
        x.zero();
        return Ok(CgResult {
            converged: true,
            iterations: 0,
            final_residual: 0.0,
            initial_residual: 0.0,
            flops: matrix.flops(),
        });
    }

    // r = b - A x
    let mut r = b.zeros_like();
    matrix.apply(&mut r, x)?;
    r.xpay(b, -1.0);

    let mut r_norm_sq = r.norm_sq();
    let initial_residual = (r_norm_sq / b_norm_sq).sqrt();
    let tol_sq = tol * tol * b_norm_sq;

    if r_norm_sq < tol_sq {
        return Ok(CgResult {
            converged: true,
            iterations: 0,
            final_residual: initial_residual,
            initial_residual,
            flops: matrix.flops(),
        });
    }

    let mut p = r.clone();
    let mut ap = b.zeros_like();
    let mut iterations = 0;

    for iter in 0..max_iter {
        iterations = iter + 1;

        matrix.apply(&mut ap, &p)?;

        // alpha = <r|r> / <p|Ap>
        let p_ap = p.dot(&ap).re;
        if p_ap.abs() < LATTICE_DIVISION_GUARD {
            break;
        }
        let alpha = r_norm_sq / p_ap;

        x.axpy(alpha, &p);
        r.axpy(-alpha, &ap);

        let r_norm_sq_new = r.norm_sq();
        trace!(
            "cg iter {iterations}: |r|/|b| = {:.3e}",
            (r_norm_sq_new / b_norm_sq).sqrt()
        );

        if r_norm_sq_new < tol_sq {
            r_norm_sq = r_norm_sq_new;
            break;
        }

        // beta = <r_new|r_new> / <r_old|r_old>
        let beta = r_norm_sq_new / r_norm_sq;
        r_norm_sq = r_norm_sq_new;

        // p = r + beta * p
        p.xpay(&r, beta);
    }

    let final_residual = (r_norm_sq / b_norm_sq).sqrt();

    Ok(CgResult {
        converged: final_residual < tol,
        iterations,
        final_residual,
        initial_residual,
        flops: matrix.flops(),
    })
}

/// Outcome of one shifted system in [`cg_multishift`].
#[derive(Clone, Debug)]
pub struct ShiftOutcome {
    pub offset: f64,
    pub converged: bool,
    /// Iteration at which this shift stopped updating.
    pub iterations: usize,
    /// `|ζ_i| |r| / |b|`, the recursively updated shifted residual.
    pub final_residual: f64,
}

/// Multi-shift CG result.
#[derive(Clone, Debug)]
pub struct MultiShiftResult {
    /// One entry per offset, in the caller's order.
    pub shifts: Vec<ShiftOutcome>,
    pub iterations: usize,
    pub flops: u64,
}

impl MultiShiftResult {
    /// Every shifted system reached its tolerance.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.shifts.iter().all(|s| s.converged)
    }
}

/// Solve `(A + σ_i) x_i = b` for every offset `σ_i` in one Krylov space.
///
/// `xs[i]` receives the solution for `offsets[i]` and is zeroed on entry;
/// the shifted recurrences need a zero initial guess. `tol[i]` is the
/// relative residual target of shift `i`. A shift stops updating once it
/// converges; the solve ends when all have, or at `max_iter`.
///
/// `A + min(σ)` must be Hermitian positive definite. The operator is applied
/// once per iteration whatever the number of shifts.
///
/// # Errors
///
/// [`DiracError::Unsupported`] without offsets or when `xs`, `offsets` and
/// `tol` differ in length; [`DiracError::FieldMismatch`] when a solution
/// field is shaped unlike `b`; any mismatch reported by the operator.
pub fn cg_multishift<A: DiracMatrix + ?Sized>(
    matrix: &A,
    xs: &mut [ColorSpinorField],
    b: &ColorSpinorField,
    offsets: &[f64],
    tol: &[f64],
    max_iter: usize,
) -> DiracResult<MultiShiftResult> {
    let n_shift = offsets.len();
    if n_shift == 0 || xs.len() != n_shift || tol.len() != n_shift {
        return Err(DiracError::unsupported(format!(
            "multi-shift CG needs one solution and one tolerance per offset: \
             {n_shift} offsets, {} solutions, {} tolerances",
            xs.len(),
            tol.len()
        )));
    }
    if let Some(x) = xs.iter().find(|x| x.shape() != b.shape()) {
        return Err(DiracError::mismatch(
            "x",
            "shape",
            format!("{:?}", b.shape()),
            format!("{:?}", x.shape()),
        ));
    }
    for x in xs.iter_mut() {
        x.zero();
    }

    let mut shifts: Vec<ShiftOutcome> = offsets
        .iter()
        .map(|&offset| ShiftOutcome {
            offset,
            converged: false,
            iterations: 0,
            final_residual: 1.0,
        })
        .collect();

    let b_norm_sq = b.norm_sq();
    if b_norm_sq < LATTICE_DIVISION_GUARD {
        for shift in &mut shifts {
            shift.converged = true;
            shift.final_residual = 0.0;
        }
        return Ok(MultiShiftResult {
            shifts,
            iterations: 0,
            flops: matrix.flops(),
        });
    }

    // The base system carries the smallest shift; the others are relative to it.
    let sigma_base = offsets.iter().copied().fold(f64::INFINITY, f64::min);
    let relative: Vec<f64> = offsets.iter().map(|&o| o - sigma_base).collect();

    let mut r = b.clone();
    let mut p = b.clone();
    let mut ps = vec![b.clone(); n_shift];
    let mut ap = b.zeros_like();
    let mut zeta = vec![1.0; n_shift];
    let mut zeta_old = vec![1.0; n_shift];
    let mut r_norm_sq = b_norm_sq;
    let mut alpha_old = 1.0;
    let mut beta_old = 0.0;
    let mut iterations = 0;

    for iter in 0..max_iter {
        iterations = iter + 1;

        // Ap = (A + σ_base) p
        matrix.apply(&mut ap, &p)?;
        ap.axpy(sigma_base, &p);

        let p_ap = p.dot(&ap).re;
        if p_ap.abs() < LATTICE_DIVISION_GUARD {
            break;
        }
        let alpha = r_norm_sq / p_ap;

        for (i, x) in xs.iter_mut().enumerate() {
            if shifts[i].converged {
                continue;
            }
            let denom = alpha * beta_old * (zeta_old[i] - zeta[i])
                + zeta_old[i] * alpha_old * (1.0 + relative[i] * alpha);
            let zeta_new = zeta[i] * zeta_old[i] * alpha_old / denom;
            x.axpy(alpha * zeta_new / zeta[i], &ps[i]);
            zeta_old[i] = zeta[i];
            zeta[i] = zeta_new;
        }

        r.axpy(-alpha, &ap);
        let r_norm_sq_new = r.norm_sq();
        let beta = r_norm_sq_new / r_norm_sq;
        r_norm_sq = r_norm_sq_new;
        let base_residual = (r_norm_sq / b_norm_sq).sqrt();
        trace!("multi-shift cg iter {iterations}: |r|/|b| = {base_residual:.3e}");

        for (i, (shift, p_i)) in shifts.iter_mut().zip(ps.iter_mut()).enumerate() {
            if shift.converged {
                continue;
            }
            shift.iterations = iterations;
            shift.final_residual = zeta[i].abs() * base_residual;
            if shift.final_residual < tol[i] {
                shift.converged = true;
                continue;
            }
            // p_i = ζ_i r + β_i p_i
            let ratio = zeta[i] / zeta_old[i];
            p_i.scale(beta * ratio * ratio);
            p_i.axpy(zeta[i], &r);
        }
        if shifts.iter().all(|s| s.converged) {
            break;
        }

        p.xpay(&r, beta);
        alpha_old = alpha;
        beta_old = beta;
    }

    Ok(MultiShiftResult {
        shifts,
        iterations,
        flops: matrix.flops(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::lattice::gauge::{GaugeField, LinkKind};
    use crate::lattice::geometry::LatticeGeometry;
    use crate::lattice::spinor::{Precision, SiteSubset};
    use crate::operator::{
        DagType, Dirac, DiracM, DiracMdagM, DiracOperator, DiracParam, DiracType, MatPcType,
    };
    use crate::tolerances::{
        LATTICE_CG_RESIDUAL, LATTICE_CG_VERIFY_RESIDUAL, MULTISHIFT_SOLUTION_REL,
    };

    /// `A + σ` for single-shift reference solves.
    struct Shifted<'a, A: DiracMatrix> {
        inner: &'a A,
        sigma: f64,
    }

    impl<A: DiracMatrix> DiracMatrix for Shifted<'_, A> {
        fn apply(&self, out: &mut ColorSpinorField, input: &ColorSpinorField) -> DiracResult<()> {
            self.inner.apply(out, input)?;
            out.axpy(self.sigma, input);
            Ok(())
        }

        fn flops(&self) -> u64 {
            self.inner.flops()
        }
    }

    fn wilson(hot: bool) -> DiracOperator {
        let g = LatticeGeometry::new([4, 4, 4, 4]).unwrap();
        let gauge = if hot {
            GaugeField::hot_start(g, LinkKind::Thin, 0.5, 42)
        } else {
            GaugeField::cold_start(g, LinkKind::Thin)
        };
        DiracOperator::create(&DiracParam {
            dirac_type: DiracType::WilsonPc,
            kappa: 0.1,
            matpc: MatPcType::EvenEven,
            dagger: DagType::No,
            gauge: Some(Arc::new(gauge)),
            ..DiracParam::default()
        })
        .unwrap()
    }

    #[test]
    fn cg_identity_lattice() {
        let op = wilson(false);
        let b = ColorSpinorField::random(
            *op.geometry(),
            4,
            SiteSubset::Parity,
            Precision::Double,
            42,
        );
        let mut x = b.zeros_like();

        let result = cg_solve(&DiracMdagM::new(&op), &mut x, &b, 1e-8, 500).unwrap();

        assert!(
            result.converged,
            "CG should converge on identity lattice: residual={}",
            result.final_residual
        );
        assert!(result.flops > 0);
    }

    #[test]
    fn cg_zero_rhs() {
        let op = wilson(false);
        let b = op.create_spinor();
        let mut x = ColorSpinorField::random(
            *op.geometry(),
            4,
            SiteSubset::Parity,
            Precision::Double,
            1,
        );

        let result = cg_solve(&DiracMdagM::new(&op), &mut x, &b, 1e-10, 100).unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(x.norm_sq(), 0.0);
    }

    #[test]
    fn cg_verify_solution() {
        let op = wilson(true);
        let b = ColorSpinorField::random(
            *op.geometry(),
            4,
            SiteSubset::Parity,
            Precision::Double,
            99,
        );
        let mut x = b.zeros_like();

        let result =
            cg_solve(&DiracMdagM::new(&op), &mut x, &b, LATTICE_CG_RESIDUAL, 1000).unwrap();
        assert!(result.converged, "CG should converge");

        // Verify: A x ≈ b
        let mut ax = b.zeros_like();
        op.mdag_m(&mut ax, &x).unwrap();
        ax.axpy(-1.0, &b);
        let rel_residual = (ax.norm_sq() / b.norm_sq()).sqrt();
        assert!(
            rel_residual < LATTICE_CG_VERIFY_RESIDUAL,
            "Ax should ≈ b: relative residual = {rel_residual}"
        );
    }

    #[test]
    fn cg_rejects_mismatched_fields() {
        let op = wilson(false);
        let b =
            ColorSpinorField::random(*op.geometry(), 4, SiteSubset::Full, Precision::Double, 3);
        let mut x = b.zeros_like();
        assert!(cg_solve(&DiracM::new(&op), &mut x, &b, 1e-8, 10).is_err());
    }

    #[test]
    fn multishift_matches_single_shift_solves() {
        let op = wilson(true);
        let mdag_m = DiracMdagM::new(&op);
        let b = ColorSpinorField::random(
            *op.geometry(),
            4,
            SiteSubset::Parity,
            Precision::Double,
            17,
        );
        // Unsorted on purpose: the base system is the smallest shift.
        let offsets = [0.5, 0.0, 0.05];
        let tol = [1e-10; 3];
        let mut xs = vec![b.zeros_like(); 3];
        xs[0] = b.clone();

        let result = cg_multishift(&mdag_m, &mut xs, &b, &offsets, &tol, 1000).unwrap();
        assert!(result.converged(), "{:?}", result.shifts);
        assert!(result.flops > 0);
        assert!(result.shifts[0].iterations <= result.shifts[1].iterations);
        assert_eq!(result.iterations, result.shifts[1].iterations);

        for (x, &sigma) in xs.iter().zip(&offsets) {
            let shifted = Shifted { inner: &mdag_m, sigma };
            let mut reference = b.zeros_like();
            let single = cg_solve(&shifted, &mut reference, &b, 1e-10, 1000).unwrap();
            assert!(single.converged);

            let mut diff = x.clone();
            diff.axpy(-1.0, &reference);
            let rel = (diff.norm_sq() / reference.norm_sq()).sqrt();
            assert!(rel < MULTISHIFT_SOLUTION_REL, "σ={sigma}: |x − x_ref|/|x_ref| = {rel}");

            let mut ax = b.zeros_like();
            shifted.apply(&mut ax, x).unwrap();
            ax.axpy(-1.0, &b);
            let residual = (ax.norm_sq() / b.norm_sq()).sqrt();
            assert!(residual < LATTICE_CG_VERIFY_RESIDUAL, "σ={sigma}: residual {residual}");
        }
    }

    #[test]
    fn multishift_zero_rhs_zeroes_every_solution() {
        let op = wilson(false);
        let b = op.create_spinor();
        let mut xs = vec![
            ColorSpinorField::random(*op.geometry(), 4, SiteSubset::Parity, Precision::Double, 2);
            2
        ];
        let result =
            cg_multishift(&DiracMdagM::new(&op), &mut xs, &b, &[0.1, 0.2], &[1e-8; 2], 10).unwrap();
        assert!(result.converged());
        assert_eq!(result.iterations, 0);
        for x in &xs {
            assert_eq!(x.norm_sq(), 0.0);
        }
    }

    #[test]
    fn multishift_rejects_inconsistent_inputs() {
        let op = wilson(false);
        let m = DiracMdagM::new(&op);
        let b = op.create_spinor();

        let mut xs = vec![b.zeros_like(); 2];
        let err = cg_multishift(&m, &mut xs, &b, &[0.1], &[1e-8], 10);
        assert!(matches!(err, Err(DiracError::Unsupported(_))));
        let err = cg_multishift(&m, &mut xs, &b, &[0.1, 0.2], &[1e-8], 10);
        assert!(matches!(err, Err(DiracError::Unsupported(_))));
        let mut none: [ColorSpinorField; 0] = [];
        let err = cg_multishift(&m, &mut none, &b, &[], &[], 10);
        assert!(matches!(err, Err(DiracError::Unsupported(_))));

        let staggered =
            ColorSpinorField::random(*op.geometry(), 1, SiteSubset::Parity, Precision::Double, 4);
        let mut xs = vec![b.zeros_like(), staggered];
        let err = cg_multishift(&m, &mut xs, &b, &[0.1, 0.2], &[1e-8; 2], 10);
        assert!(matches!(err, Err(DiracError::FieldMismatch { field: "x", .. })));
    }
}
