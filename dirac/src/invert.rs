// SPDX-License-Identifier: AGPL-3.0-only

//! Inversion driver: solver configuration in, solution field out.
//!
//! [`invert`] runs the full pipeline a Krylov solver expects from the
//! operator layer:
//!
//! 1. translate [`InvertParam`] into a [`DiracParam`] and build the operator;
//! 2. [`Dirac::prepare`] the system for the requested solution type;
//! 3. CG on `M†M` (normal equations) or on `M` (Hermitian staggered PC);
//! 4. [`Dirac::reconstruct`] the full solution.
//!
//! [`invert_multishift`] solves one system per entry of
//! [`InvertParam::offsets`] with a single multi-shift CG and no
//! reconstruction.
//!
//! The configuration is plain JSON:
//!
//! ```json
//! { "dslash_type": "clover", "kappa": 0.12, "matpc_type": "even_even",
//!   "solution_type": "mat", "solve_type": "normal_eq_pc", "tol": 1e-10 }
//! ```

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cg::{cg_multishift, cg_solve, CgResult, MultiShiftResult, ShiftOutcome};
use crate::error::{DiracError, DiracResult};
use crate::lattice::clover::CloverField;
use crate::lattice::gauge::GaugeField;
use crate::lattice::spinor::{ColorSpinorField, Precision};
use crate::operator::{
    DagType, Dirac, DiracM, DiracMdagM, DiracOperator, DiracParam, DiracType, DslashType,
    MatPcType, PreparedSystem, SolutionType, SolveType, Verbosity,
};
use crate::tolerances::{INVERT_DEFAULT_MAXITER, INVERT_DEFAULT_TOL};

/// Solver configuration.
///
/// Missing keys take the [`Default`] values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvertParam {
    pub dslash_type: DslashType,
    pub kappa: f64,
    pub mass: f64,
    pub matpc_type: MatPcType,
    pub dagger: DagType,
    pub solution_type: SolutionType,
    pub solve_type: SolveType,
    pub precision: Precision,
    pub precision_sloppy: Precision,
    /// Relative residual target.
    pub tol: f64,
    pub maxiter: usize,
    pub verbosity: Verbosity,
    /// Shifts for [`invert_multishift`]. For a staggered `mat_pc` solution
    /// these are mass terms `4 m_i²`; for `M†M` solutions they add to `M†M`.
    pub offsets: Vec<f64>,
    /// Residual target per offset; empty means `tol` for every offset.
    pub tol_offset: Vec<f64>,
}

impl Default for InvertParam {
    fn default() -> Self {
        Self {
            dslash_type: DslashType::Wilson,
            kappa: 0.12,
            mass: 0.1,
            matpc_type: MatPcType::EvenEven,
            dagger: DagType::No,
            solution_type: SolutionType::Mat,
            solve_type: SolveType::NormalEqPc,
            precision: Precision::Double,
            precision_sloppy: Precision::Double,
            tol: INVERT_DEFAULT_TOL,
            maxiter: INVERT_DEFAULT_MAXITER,
            verbosity: Verbosity::Silent,
            offsets: Vec::new(),
            tol_offset: Vec::new(),
        }
    }
}

impl InvertParam {
    /// Parse a JSON configuration record.
    ///
    /// # Errors
    ///
    /// [`DiracError::Param`] for malformed JSON or unknown enum names.
    pub fn from_json(json: &str) -> DiracResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Background fields an inversion may need. Unused slots stay `None`.
#[derive(Clone, Debug, Default)]
pub struct BackgroundFields {
    pub gauge: Option<Arc<GaugeField>>,
    pub fat_gauge: Option<Arc<GaugeField>>,
    pub long_gauge: Option<Arc<GaugeField>>,
    pub clover: Option<Arc<CloverField>>,
    pub clover_inv: Option<Arc<CloverField>>,
}

impl BackgroundFields {
    #[must_use]
    pub fn wilson(gauge: GaugeField) -> Self {
        Self {
            gauge: Some(Arc::new(gauge)),
            ..Self::default()
        }
    }

    /// Gauge field plus clover term, with the inverse computed here.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] if a clover block is singular.
    pub fn clover(gauge: GaugeField, clover: CloverField) -> DiracResult<Self> {
        let clover_inv = clover.inverse()?;
        Ok(Self {
            gauge: Some(Arc::new(gauge)),
            clover: Some(Arc::new(clover)),
            clover_inv: Some(Arc::new(clover_inv)),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn staggered(fat: GaugeField, long: GaugeField) -> Self {
        Self {
            fat_gauge: Some(Arc::new(fat)),
            long_gauge: Some(Arc::new(long)),
            ..Self::default()
        }
    }
}

/// Outcome of one inversion.
#[derive(Clone, Debug)]
pub struct InvertResult {
    pub dirac_type: DiracType,
    pub converged: bool,
    pub iterations: usize,
    /// Relative residual of the system the solver saw.
    pub residual: f64,
    /// Operator flops of the whole pipeline.
    pub flops: u64,
    pub secs: f64,
    pub gflops: f64,
}

/// Solve for `x` as configured by `param`.
///
/// `x` must have the shape the solution type implies (full fields for
/// `mat`/`mat_dag_mat`, one parity for the reduced types) and holds the
/// initial guess on entry. A solve that stops at `maxiter` is not an error;
/// check [`InvertResult::converged`].
///
/// # Errors
///
/// Operator construction errors, [`DiracError::FieldMismatch`] for
/// ill-shaped fields, and [`DiracError::Unsupported`] for a direct solve on a
/// non-Hermitian operator or a solution type the operator cannot reduce.
pub fn invert(
    param: &InvertParam,
    x: &mut ColorSpinorField,
    b: &ColorSpinorField,
    fields: &BackgroundFields,
) -> DiracResult<InvertResult> {
    let start = Instant::now();
    let dirac = DiracOperator::create(&DiracParam::from_invert_param(param, fields))?;

    let cg = solve(&dirac, param, x, b)?;
    dirac.reconstruct(x, b, param.solution_type)?;

    let flops = cg.flops + dirac.flops();
    let secs = start.elapsed().as_secs_f64();
    let result = InvertResult {
        dirac_type: dirac.dirac_type(),
        converged: cg.converged,
        iterations: cg.iterations,
        residual: cg.final_residual,
        flops,
        secs,
        gflops: if secs > 0.0 { flops as f64 * 1e-9 / secs } else { 0.0 },
    };

    if !result.converged {
        warn!(
            "{:?} inversion stopped after {} iterations at residual {:.3e} (tol {:.1e})",
            result.dirac_type, result.iterations, result.residual, param.tol
        );
    } else if param.verbosity >= Verbosity::Summarize {
        info!(
            "{:?} inversion: {} iter, residual {:.3e}, {:.4} s, {:.2} Gflop/s",
            result.dirac_type, result.iterations, result.residual, result.secs, result.gflops
        );
    }
    Ok(result)
}

/// Outcome of a multi-shift inversion.
#[derive(Clone, Debug)]
pub struct MultiShiftInvertResult {
    pub dirac_type: DiracType,
    /// One entry per offset, carrying the offset as configured.
    pub shifts: Vec<ShiftOutcome>,
    pub iterations: usize,
    pub flops: u64,
    pub secs: f64,
    pub gflops: f64,
}

impl MultiShiftInvertResult {
    #[must_use]
    pub fn converged(&self) -> bool {
        self.shifts.iter().all(|s| s.converged)
    }
}

/// Solve one system per entry of `param.offsets` from a single source.
///
/// Two systems are supported, both without reconstruction:
///
/// - `mat_pc` on the staggered PC operator: `xs[i]` solves
///   `(4 m_i² − D D) x = b` with `offsets[i] = 4 m_i²`, i.e. the reduced
///   system at mass `m_i`. The operator's own `4 m²` is taken out of each
///   offset.
/// - `mat_pc_dag_mat_pc` on a preconditioned operator or `mat_dag_mat` on an
///   unpreconditioned one: `xs[i]` solves `(M†M + offsets[i]) x = b`.
///
/// Every `xs[i]` must be shaped like `b` and is overwritten.
///
/// # Errors
///
/// [`DiracError::Unsupported`] without offsets, when `xs` or
/// `tol_offset` does not match the offset count, or for any other solution
/// type; operator construction errors and [`DiracError::FieldMismatch`] for
/// ill-shaped fields.
pub fn invert_multishift(
    param: &InvertParam,
    xs: &mut [ColorSpinorField],
    b: &ColorSpinorField,
    fields: &BackgroundFields,
) -> DiracResult<MultiShiftInvertResult> {
    let start = Instant::now();
    if param.offsets.is_empty() {
        return Err(DiracError::unsupported("multi-shift inversion without offsets"));
    }
    let tol = if param.tol_offset.is_empty() {
        vec![param.tol; param.offsets.len()]
    } else {
        param.tol_offset.clone()
    };

    let dirac = DiracOperator::create(&DiracParam::from_invert_param(param, fields))?;
    let cg = solve_multishift(&dirac, param, xs, b, &tol)?;

    let flops = cg.flops + dirac.flops();
    let secs = start.elapsed().as_secs_f64();
    let mut shifts = cg.shifts;
    for (shift, &offset) in shifts.iter_mut().zip(&param.offsets) {
        shift.offset = offset;
    }
    let result = MultiShiftInvertResult {
        dirac_type: dirac.dirac_type(),
        shifts,
        iterations: cg.iterations,
        flops,
        secs,
        gflops: if secs > 0.0 { flops as f64 * 1e-9 / secs } else { 0.0 },
    };

    for shift in result.shifts.iter().filter(|s| !s.converged) {
        warn!(
            "{:?} multi-shift offset {:.4e} stopped after {} iterations at residual {:.3e}",
            result.dirac_type, shift.offset, shift.iterations, shift.final_residual
        );
    }
    if param.verbosity >= Verbosity::Summarize {
        info!(
            "{:?} multi-shift inversion: {} offsets, {} iter, {:.4} s, {:.2} Gflop/s",
            result.dirac_type,
            result.shifts.len(),
            result.iterations,
            result.secs,
            result.gflops
        );
    }
    if param.verbosity >= Verbosity::Verbose {
        for shift in &result.shifts {
            debug!(
                "  offset {:.4e}: {} iter, residual {:.3e}",
                shift.offset, shift.iterations, shift.final_residual
            );
        }
    }
    Ok(result)
}

fn solve_multishift(
    dirac: &DiracOperator,
    param: &InvertParam,
    xs: &mut [ColorSpinorField],
    b: &ColorSpinorField,
    tol: &[f64],
) -> DiracResult<MultiShiftResult> {
    let preconditioned = dirac.is_preconditioned();
    match (param.solution_type, dirac.dirac_type()) {
        (SolutionType::MatPc, DiracType::StaggeredPc) => {
            // M_pc already carries 4m² on its diagonal.
            let mass_term = 4.0 * param.mass * param.mass;
            let shifts: Vec<f64> = param.offsets.iter().map(|o| o - mass_term).collect();
            cg_multishift(&DiracM::new(dirac), xs, b, &shifts, tol, param.maxiter)
        }
        (SolutionType::MatPcDagMatPc, _) if preconditioned => {
            cg_multishift(&DiracMdagM::new(dirac), xs, b, &param.offsets, tol, param.maxiter)
        }
        (SolutionType::MatDagMat, _) if !preconditioned => {
            cg_multishift(&DiracMdagM::new(dirac), xs, b, &param.offsets, tol, param.maxiter)
        }
        (solution, dirac_type) => Err(DiracError::unsupported(format!(
            "multi-shift {solution:?} solution on {dirac_type:?}: needs mat_pc on a staggered \
             PC operator, or M†M matching the operator's preconditioning"
        ))),
    }
}

fn solve(
    dirac: &DiracOperator,
    param: &InvertParam,
    x: &mut ColorSpinorField,
    b: &ColorSpinorField,
) -> DiracResult<CgResult> {
    let PreparedSystem { src, sol } = dirac.prepare(x, b, param.solution_type)?;

    let normal_solution = matches!(
        param.solution_type,
        SolutionType::MatDagMat | SolutionType::MatPcDagMatPc
    );
    if normal_solution {
        return cg_solve(&DiracMdagM::new(dirac), sol, src, param.tol, param.maxiter);
    }
    if param.solve_type.is_normal() {
        let mut rhs = src.zeros_like();
        dirac.mdag(&mut rhs, src)?;
        return cg_solve(&DiracMdagM::new(dirac), sol, &rhs, param.tol, param.maxiter);
    }
    if dirac.dirac_type() == DiracType::StaggeredPc {
        return cg_solve(&DiracM::new(dirac), sol, src, param.tol, param.maxiter);
    }
    Err(DiracError::unsupported(format!(
        "{:?} solve on {:?}: CG needs a Hermitian operator, use a normal_eq solve type",
        param.solve_type,
        dirac.dirac_type()
    )))
}
