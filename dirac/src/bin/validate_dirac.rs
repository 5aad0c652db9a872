// SPDX-License-Identifier: AGPL-3.0-only

//! Dirac Operator Validation
//!
//! Exercises every operator variant on a 4⁴ hot-start lattice:
//!   - adjointness `<u, M v> = <M† u, v>` and the dagger flag surviving `mdag`
//!   - `M†M` equal to `M†` applied to `M`, and positive
//!   - fused `dslash_xpay` bit-identical to `dslash` followed by `axpy`
//!   - flop counters that read non-zero once and then zero
//!   - even-odd reduced solves reproducing the unpreconditioned solution
//!   - multi-mass staggered solves reproducing each single-mass solve
//!   - configuration errors rejected before any arithmetic
//!
//! Exit code 0 = all checks pass, exit code 1 = any check fails.
//! `RUST_LOG=debug` shows operator construction, `RUST_LOG=trace` every CG
//! iteration.

use hotspring_dirac::invert::{invert, invert_multishift, BackgroundFields, InvertParam};
use hotspring_dirac::lattice::clover::CloverField;
use hotspring_dirac::lattice::gauge::{GaugeField, LinkKind};
use hotspring_dirac::lattice::geometry::{LatticeGeometry, Parity};
use hotspring_dirac::lattice::spinor::{ColorSpinorField, SiteSubset};
use hotspring_dirac::operator::{
    DagType, Dirac, DiracOperator, DiracParam, DslashType, MatPcType, SolutionType, SolveType,
    Verbosity,
};
use hotspring_dirac::tolerances;
use hotspring_dirac::validation::ValidationHarness;
use hotspring_dirac::{DiracError, DiracResult};

const DIMS: [usize; 4] = [4, 4, 4, 4];
const KAPPA: f64 = 0.1;
const MASS: f64 = 0.15;
const HOT_EPSILON: f64 = 0.5;
const CLOVER_STRENGTH: f64 = 0.1;
const MULTI_MASSES: [f64; 3] = [MASS, 0.2, 0.3];

/// (label, discretisation, solve type, matpc)
const VARIANTS: [(&str, DslashType, SolveType, MatPcType); 10] = [
    ("wilson", DslashType::Wilson, SolveType::NormalEq, MatPcType::EvenEven),
    ("wilson_pc", DslashType::Wilson, SolveType::NormalEqPc, MatPcType::OddOdd),
    ("clover", DslashType::Clover, SolveType::NormalEq, MatPcType::EvenEven),
    ("clover_pc", DslashType::Clover, SolveType::NormalEqPc, MatPcType::EvenEven),
    ("clover_pc_asym", DslashType::Clover, SolveType::NormalEqPc, MatPcType::OddOddAsymmetric),
    ("naive_staggered", DslashType::Staggered, SolveType::NormalEq, MatPcType::EvenEven),
    ("naive_staggered_pc", DslashType::Staggered, SolveType::DirectPc, MatPcType::OddOdd),
    ("asqtad", DslashType::Asqtad, SolveType::NormalEq, MatPcType::EvenEven),
    ("asqtad_pc", DslashType::Asqtad, SolveType::NormalEqPc, MatPcType::OddOdd),
    ("asqtad_pc_direct", DslashType::Asqtad, SolveType::DirectPc, MatPcType::EvenEven),
];

fn background_fields(g: LatticeGeometry) -> DiracResult<BackgroundFields> {
    let staggered = BackgroundFields::staggered(
        GaugeField::hot_start(g, LinkKind::Fat, HOT_EPSILON, 44),
        GaugeField::hot_start(g, LinkKind::Long, HOT_EPSILON, 45),
    );
    let clover = BackgroundFields::clover(
        GaugeField::hot_start(g, LinkKind::Thin, HOT_EPSILON, 42),
        CloverField::random(g, CLOVER_STRENGTH, 43),
    )?;
    Ok(BackgroundFields {
        fat_gauge: staggered.fat_gauge,
        long_gauge: staggered.long_gauge,
        ..clover
    })
}

fn invert_param(
    dslash_type: DslashType,
    solve_type: SolveType,
    matpc_type: MatPcType,
) -> InvertParam {
    InvertParam {
        dslash_type,
        kappa: KAPPA,
        mass: MASS,
        matpc_type,
        solve_type,
        verbosity: Verbosity::Summarize,
        ..InvertParam::default()
    }
}

#[allow(clippy::float_cmp)] // fused and unfused paths must agree bit for bit
fn operator_identities(h: &mut ValidationHarness, op: &DiracOperator) -> DiracResult<()> {
    let (g, nspin, subset, precision) = (*op.geometry(), op.nspin(), op.subset(), op.precision());
    let u = ColorSpinorField::random(g, nspin, subset, precision, 1);
    let v = ColorSpinorField::random(g, nspin, subset, precision, 2);

    let mut mv = op.create_spinor();
    let mut mdag_u = op.create_spinor();
    op.m(&mut mv, &v)?;
    op.mdag(&mut mdag_u, &u)?;
    let lhs = u.dot(&mv);
    let rhs = mdag_u.dot(&v);
    let rel = (lhs - rhs).norm() / lhs.norm();
    println!("  <u,Mv> = {lhs:.6e}, <M†u,v> = {rhs:.6e}");
    h.check_upper("<u,Mv> = <M†u,v>", rel, tolerances::OPERATOR_ADJOINT_REL);

    let mut mdag_m = op.create_spinor();
    let mut composed = op.create_spinor();
    op.mdag_m(&mut mdag_m, &v)?;
    op.mdag(&mut composed, &mv)?;
    h.check_upper(
        "M†M v = M†(M v)",
        mdag_m.max_abs_diff(&composed),
        tolerances::OPERATOR_IDENTITY_ABS,
    );
    h.check_bool("dagger unchanged after mdag/mdag_m", op.dagger() == DagType::No);
    let vmv = v.dot(&mdag_m);
    h.check_bool("<v, M†M v> > 0", vmv.re > 0.0);
    h.check_upper(
        "Im <v, M†M v> ≈ 0",
        vmv.im.abs() / vmv.re,
        tolerances::OPERATOR_ADJOINT_REL,
    );

    for k in [0.0, 0.37, -1.25] {
        let mut reference = op.create_spinor();
        let mut fused = op.create_spinor();
        op.dslash(&mut reference, &v, Parity::Even)?;
        op.dslash_xpay(&mut fused, &v, Parity::Even, &u, k)?;
        let diff = if op.is_preconditioned() {
            reference.axpy(k, &u);
            reference.max_abs_diff(&fused)
        } else {
            let r = reference.half_mut(Parity::Even)?;
            r.axpy(k, u.half(Parity::Even)?);
            r.max_abs_diff(fused.half(Parity::Even)?)
        };
        h.check_bool(&format!("dslash_xpay(k={k}) == dslash + axpy"), diff == 0.0);
    }

    op.flops();
    op.m(&mut mv, &v)?;
    let first = op.flops();
    let second = op.flops();
    println!("  M flops: {first}");
    h.check_bool("flops non-zero after M", first > 0);
    h.check_bool("flops zero on second read", second == 0);
    Ok(())
}

fn reduced_vs_full(
    h: &mut ValidationHarness,
    g: LatticeGeometry,
    fields: &BackgroundFields,
    param: &InvertParam,
) -> DiracResult<()> {
    let nspin = param.dslash_type.nspin();
    let b = ColorSpinorField::random(g, nspin, SiteSubset::Full, param.precision, 7);

    let full_param = InvertParam {
        solve_type: SolveType::NormalEq,
        ..param.clone()
    };
    let mut x_full = b.zeros_like();
    let full = invert(&full_param, &mut x_full, &b, fields)?;

    let mut x_pc = b.zeros_like();
    let reduced = invert(param, &mut x_pc, &b, fields)?;
    println!(
        "  full: {} iter, reduced: {} iter ({:.2} Gflop/s)",
        full.iterations, reduced.iterations, reduced.gflops
    );
    h.check_bool("full solve converged", full.converged);
    h.check_bool("reduced solve converged", reduced.converged);

    let mut diff = x_pc.clone();
    diff.axpy(-1.0, &x_full);
    h.check_upper(
        "reduced solution = full solution",
        (diff.norm_sq() / x_full.norm_sq()).sqrt(),
        tolerances::RECONSTRUCTED_SOLUTION_REL,
    );

    // True residual against the unpreconditioned operator.
    let op = DiracOperator::create(&DiracParam::from_invert_param(&full_param, fields))?;
    let mut r = b.zeros_like();
    op.m(&mut r, &x_pc)?;
    r.axpy(-1.0, &b);
    h.check_upper(
        "|M x − b| / |b|",
        (r.norm_sq() / b.norm_sq()).sqrt(),
        tolerances::LATTICE_CG_VERIFY_RESIDUAL,
    );
    Ok(())
}

fn multi_mass(
    h: &mut ValidationHarness,
    g: LatticeGeometry,
    fields: &BackgroundFields,
    dslash_type: DslashType,
) -> DiracResult<()> {
    let param = InvertParam {
        solution_type: SolutionType::MatPc,
        offsets: MULTI_MASSES.iter().map(|m| 4.0 * m * m).collect(),
        ..invert_param(dslash_type, SolveType::DirectPc, MatPcType::EvenEven)
    };
    let b = ColorSpinorField::random(g, 1, SiteSubset::Parity, param.precision, 8);
    let mut xs = vec![b.zeros_like(); MULTI_MASSES.len()];
    let multi = invert_multishift(&param, &mut xs, &b, fields)?;
    println!("  {} masses: {} iter", MULTI_MASSES.len(), multi.iterations);
    h.check_bool("multi-shift solve converged", multi.converged());

    for (x, mass) in xs.iter().zip(MULTI_MASSES) {
        let single = InvertParam {
            mass,
            offsets: Vec::new(),
            ..param.clone()
        };
        let mut reference = b.zeros_like();
        let result = invert(&single, &mut reference, &b, fields)?;
        h.check_bool(&format!("m={mass}: single-mass solve converged"), result.converged);
        let mut diff = x.clone();
        diff.axpy(-1.0, &reference);
        h.check_upper(
            &format!("m={mass}: multi-shift = single-mass solution"),
            (diff.norm_sq() / reference.norm_sq()).sqrt(),
            tolerances::MULTISHIFT_SOLUTION_REL,
        );
    }
    Ok(())
}

fn configuration_errors(h: &mut ValidationHarness, g: LatticeGeometry, fields: &BackgroundFields) {
    let clover_pc = invert_param(DslashType::Clover, SolveType::NormalEqPc, MatPcType::EvenEven);
    let no_inverse = BackgroundFields {
        clover_inv: None,
        ..fields.clone()
    };
    h.check_err(
        "clover_pc without clover inverse",
        &DiracOperator::create(&DiracParam::from_invert_param(&clover_pc, &no_inverse)),
        |e| matches!(e, DiracError::Unsupported(_)),
    );

    h.check_err(
        "invalid dirac type",
        &DiracOperator::create(&DiracParam {
            dagger: DagType::No,
            ..DiracParam::default()
        }),
        |e| matches!(e, DiracError::Unsupported(_)),
    );

    let wilson_pc = invert_param(DslashType::Wilson, SolveType::NormalEqPc, MatPcType::EvenEven);
    let wilson_pc = DiracParam::from_invert_param(&wilson_pc, fields);
    let pc_m_with_full_field = DiracOperator::create(&wilson_pc).and_then(|op| {
        let full = ColorSpinorField::random(g, 4, SiteSubset::Full, op.precision(), 3);
        let mut out = op.create_spinor();
        op.m(&mut out, &full)
    });
    h.check_err("PC M with full input", &pc_m_with_full_field, |e| {
        matches!(e, DiracError::FieldMismatch { .. })
    });
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Dirac Operator Validation                                 ║");
    println!("║  Wilson, clover, staggered; with and without even-odd PC   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("dirac");

    let setup = LatticeGeometry::new(DIMS).and_then(|g| Ok((g, background_fields(g)?)));
    let (g, fields) = match setup {
        Ok(s) => s,
        Err(e) => {
            println!("  background field setup failed: {e}");
            harness.check_bool("background fields", false);
            harness.finish();
        }
    };
    println!("  lattice {g}, kappa={KAPPA}, mass={MASS}, clover strength={CLOVER_STRENGTH}");
    println!();

    for (name, dslash, solve, matpc) in VARIANTS {
        harness.section(name);
        let param = invert_param(dslash, solve, matpc);
        let identities = DiracOperator::create(&DiracParam::from_invert_param(&param, &fields))
            .and_then(|op| operator_identities(&mut harness, &op));
        if let Err(e) = identities {
            println!("  {name}: {e}");
            harness.check_bool("operator identities ran", false);
        }
        if solve.is_preconditioned() {
            if let Err(e) = reduced_vs_full(&mut harness, g, &fields, &param) {
                println!("  {name}: {e}");
                harness.check_bool("reduced solve ran", false);
            }
        }
    }

    harness.section("clover_pc_dagger");
    let dagger = InvertParam {
        dagger: DagType::Yes,
        ..invert_param(DslashType::Clover, SolveType::NormalEqPc, MatPcType::EvenEven)
    };
    if let Err(e) = reduced_vs_full(&mut harness, g, &fields, &dagger) {
        println!("  clover_pc_dagger: {e}");
        harness.check_bool("reduced solve ran", false);
    }

    for (name, dslash) in [
        ("asqtad_multi_mass", DslashType::Asqtad),
        ("naive_multi_mass", DslashType::Staggered),
    ] {
        harness.section(name);
        if let Err(e) = multi_mass(&mut harness, g, &fields, dslash) {
            println!("  {name}: {e}");
            harness.check_bool("multi-shift solve ran", false);
        }
    }

    harness.section("configuration errors");
    configuration_errors(&mut harness, g, &fields);

    harness.finish();
}
