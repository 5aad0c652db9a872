// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: operator contract across all six variants.
//!
//! Each property is checked for every discretisation through the public
//! factory, so the trait's provided methods, the per-variant kernels and
//! the field validation layer are exercised together.

use std::sync::Arc;

use hotspring_dirac::invert::BackgroundFields;
use hotspring_dirac::lattice::clover::CloverField;
use hotspring_dirac::lattice::gauge::{GaugeField, LinkKind};
use hotspring_dirac::lattice::geometry::{LatticeGeometry, Parity};
use hotspring_dirac::lattice::spinor::{ColorSpinorField, Precision, SiteSubset};
use hotspring_dirac::operator::{
    DagType, Dirac, DiracOperator, DiracParam, DiracType, MatPcType, ScratchPool,
};
use hotspring_dirac::tolerances;
use hotspring_dirac::DiracError;

const ALL_TYPES: [DiracType; 6] = [
    DiracType::Wilson,
    DiracType::WilsonPc,
    DiracType::Clover,
    DiracType::CloverPc,
    DiracType::Staggered,
    DiracType::StaggeredPc,
];

fn geometry() -> LatticeGeometry {
    LatticeGeometry::new([4, 4, 2, 4]).unwrap()
}

fn fields(g: LatticeGeometry) -> BackgroundFields {
    let clover = BackgroundFields::clover(
        GaugeField::hot_start(g, LinkKind::Thin, 0.5, 11),
        CloverField::random(g, 0.1, 12),
    )
    .unwrap();
    BackgroundFields {
        fat_gauge: Some(Arc::new(GaugeField::hot_start(g, LinkKind::Fat, 0.5, 13))),
        long_gauge: Some(Arc::new(GaugeField::hot_start(g, LinkKind::Long, 0.5, 14))),
        ..clover
    }
}

fn param(dirac_type: DiracType, matpc: MatPcType, dagger: DagType) -> DiracParam {
    let f = fields(geometry());
    DiracParam {
        dirac_type,
        kappa: 0.1,
        mass: 0.15,
        matpc,
        dagger,
        gauge: f.gauge,
        fat_gauge: f.fat_gauge,
        long_gauge: f.long_gauge,
        clover: f.clover,
        clover_inv: f.clover_inv,
        ..DiracParam::default()
    }
}

fn operator(dirac_type: DiracType, matpc: MatPcType, dagger: DagType) -> DiracOperator {
    DiracOperator::create(&param(dirac_type, matpc, dagger)).unwrap()
}

fn random_for(op: &DiracOperator, seed: u64) -> ColorSpinorField {
    ColorSpinorField::random(*op.geometry(), op.nspin(), op.subset(), op.precision(), seed)
}

/// Apply γ5 = diag(1, 1, −1, −1) in place.
fn gamma5(field: &mut ColorSpinorField) {
    for parity in [Parity::Even, Parity::Odd] {
        let data = field.half_mut(parity).unwrap().data_mut().unwrap();
        for site in data.chunks_mut(12) {
            for z in &mut site[6..] {
                *z = -*z;
            }
        }
    }
}

#[test]
fn factory_reports_the_requested_variant() {
    for t in ALL_TYPES {
        let op = operator(t, MatPcType::EvenEven, DagType::No);
        assert_eq!(op.dirac_type(), t);
        assert_eq!(op.is_preconditioned(), t.is_preconditioned());
        let expected_nspin = if matches!(t, DiracType::Staggered | DiracType::StaggeredPc) {
            1
        } else {
            4
        };
        assert_eq!(op.nspin(), expected_nspin, "{t:?}");
    }
}

#[test]
fn mdag_is_the_adjoint_and_leaves_dagger_alone() {
    for t in ALL_TYPES {
        for dagger in [DagType::No, DagType::Yes] {
            let op = operator(t, MatPcType::OddOdd, dagger);
            let u = random_for(&op, 1);
            let v = random_for(&op, 2);
            let mut mv = op.create_spinor();
            let mut mdag_u = op.create_spinor();
            op.m(&mut mv, &v).unwrap();
            op.mdag(&mut mdag_u, &u).unwrap();
            assert_eq!(op.dagger(), dagger, "{t:?}: mdag changed the dagger flag");

            let lhs = u.dot(&mv);
            let rhs = mdag_u.dot(&v);
            assert!(
                (lhs - rhs).norm() < tolerances::OPERATOR_ADJOINT_REL * lhs.norm(),
                "{t:?} dagger={dagger:?}: <u,Mv>={lhs}, <M†u,v>={rhs}"
            );
        }
    }
}

#[test]
fn mdag_of_mdag_is_m() {
    for t in ALL_TYPES {
        let op = operator(t, MatPcType::EvenEven, DagType::No);
        let dag = operator(t, MatPcType::EvenEven, DagType::Yes);
        let v = random_for(&op, 3);
        let mut m = op.create_spinor();
        let mut dag_mdag = op.create_spinor();
        op.m(&mut m, &v).unwrap();
        dag.mdag(&mut dag_mdag, &v).unwrap();
        assert_eq!(m.max_abs_diff(&dag_mdag), 0.0, "{t:?}");
    }
}

#[test]
fn mdag_m_is_mdag_of_m_and_positive() {
    for t in ALL_TYPES {
        let op = operator(t, MatPcType::EvenEvenAsymmetric, DagType::No);
        let v = random_for(&op, 4);
        let mut mv = op.create_spinor();
        let mut composed = op.create_spinor();
        let mut fused = op.create_spinor();
        op.m(&mut mv, &v).unwrap();
        op.mdag(&mut composed, &mv).unwrap();
        op.mdag_m(&mut fused, &v).unwrap();
        assert_eq!(fused.max_abs_diff(&composed), 0.0, "{t:?}");
        assert_eq!(op.dagger(), DagType::No);

        let vmv = v.dot(&fused);
        assert!(vmv.re > 0.0, "{t:?}: <v,M†Mv> = {vmv}");
        assert!((vmv.re - mv.norm_sq()).abs() < tolerances::OPERATOR_ADJOINT_REL * vmv.re);
    }
}

#[test]
fn dslash_xpay_is_dslash_then_axpy_bit_for_bit() {
    for t in ALL_TYPES {
        let op = operator(t, MatPcType::OddOdd, DagType::No);
        let input = random_for(&op, 5);
        let x = random_for(&op, 6);
        for parity in [Parity::Even, Parity::Odd] {
            for k in [0.0, 0.5, -0.75] {
                let mut reference = op.create_spinor();
                let mut fused = op.create_spinor();
                op.dslash(&mut reference, &input, parity).unwrap();
                op.dslash_xpay(&mut fused, &input, parity, &x, k).unwrap();
                if op.is_preconditioned() {
                    reference.axpy(k, &x);
                    assert_eq!(reference.max_abs_diff(&fused), 0.0, "{t:?} k={k}");
                } else {
                    let r = reference.half_mut(parity).unwrap();
                    r.axpy(k, x.half(parity).unwrap());
                    assert_eq!(r.max_abs_diff(fused.half(parity).unwrap()), 0.0, "{t:?} k={k}");
                    // The other parity of out is not written.
                    assert_eq!(fused.half(parity.other()).unwrap().norm_sq(), 0.0);
                }
            }
        }
    }
}

#[test]
fn wilson_type_operators_are_gamma5_hermitian() {
    for t in [DiracType::Wilson, DiracType::Clover] {
        let op = operator(t, MatPcType::EvenEven, DagType::No);
        let v = random_for(&op, 7);

        // γ5 M γ5 v
        let mut g5v = v.clone();
        gamma5(&mut g5v);
        let mut lhs = op.create_spinor();
        op.m(&mut lhs, &g5v).unwrap();
        gamma5(&mut lhs);

        let mut rhs = op.create_spinor();
        op.mdag(&mut rhs, &v).unwrap();
        let scale = rhs.norm_sq().sqrt();
        assert!(
            lhs.max_abs_diff(&rhs) < tolerances::GAMMA5_HERMITICITY_REL * scale,
            "{t:?}: γ5 M γ5 ≠ M†"
        );
    }
}

#[test]
fn staggered_hopping_is_anti_hermitian() {
    let op = operator(DiracType::StaggeredPc, MatPcType::EvenEven, DagType::No);
    let u = random_for(&op, 8);
    let v = random_for(&op, 9);
    let mut du = op.create_spinor();
    let mut dv = op.create_spinor();
    // D_eo maps odd → even, D_oe even → odd: <u, D_eo v> = −<D_oe u, v>.
    op.dslash(&mut dv, &v, Parity::Even).unwrap();
    op.dslash(&mut du, &u, Parity::Odd).unwrap();
    let lhs = u.dot(&dv);
    let rhs = du.dot(&v);
    assert!((lhs + rhs).norm() < tolerances::OPERATOR_ADJOINT_REL * lhs.norm());
}

#[test]
fn flops_read_once_then_zero() {
    for t in ALL_TYPES {
        let op = operator(t, MatPcType::EvenEven, DagType::No);
        let v = random_for(&op, 10);
        let mut out = op.create_spinor();
        assert_eq!(op.flops(), 0);
        op.m(&mut out, &v).unwrap();
        assert!(op.flops() > 0, "{t:?}");
        assert_eq!(op.flops(), 0, "{t:?}");
    }
}

#[test]
fn clone_copies_the_flop_count_and_shares_fields() {
    let op = operator(DiracType::CloverPc, MatPcType::EvenEven, DagType::No);
    let v = random_for(&op, 11);
    let mut out = op.create_spinor();
    op.m(&mut out, &v).unwrap();
    let copy = op.clone();
    let counted = op.flops();
    assert!(counted > 0);
    assert_eq!(copy.flops(), counted);

    let mut out_copy = copy.create_spinor();
    copy.m(&mut out_copy, &v).unwrap();
    assert_eq!(out.max_abs_diff(&out_copy), 0.0);
}

#[test]
fn clover_pc_without_inverse_is_unsupported() {
    let p = DiracParam {
        clover_inv: None,
        ..param(DiracType::CloverPc, MatPcType::EvenEven, DagType::No)
    };
    assert!(matches!(DiracOperator::create(&p), Err(DiracError::Unsupported(_))));

    // The unpreconditioned clover operator only needs the term itself.
    let p = DiracParam {
        clover_inv: None,
        ..param(DiracType::Clover, MatPcType::EvenEven, DagType::No)
    };
    assert!(DiracOperator::create(&p).is_ok());
}

#[test]
fn mislabelled_links_are_rejected_by_the_factory() {
    let g = geometry();
    let cold = |kind| Some(Arc::new(GaugeField::cold_start(g, kind)));

    // Thin links in the fat slot and fat links in the long slot.
    let swapped = DiracParam {
        fat_gauge: cold(LinkKind::Thin),
        long_gauge: cold(LinkKind::Fat),
        ..param(DiracType::StaggeredPc, MatPcType::EvenEven, DagType::No)
    };
    assert!(matches!(DiracOperator::create(&swapped), Err(DiracError::Unsupported(_))));

    for dirac_type in [DiracType::Wilson, DiracType::CloverPc] {
        let smeared = DiracParam {
            gauge: cold(LinkKind::Fat),
            ..param(dirac_type, MatPcType::EvenEven, DagType::No)
        };
        assert!(
            matches!(DiracOperator::create(&smeared), Err(DiracError::Unsupported(_))),
            "{dirac_type:?} accepted fat links"
        );
    }

    // Correctly labelled cold links build every variant.
    for dirac_type in ALL_TYPES {
        let labelled = DiracParam {
            gauge: cold(LinkKind::Thin),
            fat_gauge: cold(LinkKind::Fat),
            long_gauge: cold(LinkKind::Long),
            ..param(dirac_type, MatPcType::EvenEven, DagType::No)
        };
        assert!(DiracOperator::create(&labelled).is_ok(), "{dirac_type:?}");
    }
}

#[test]
fn pc_operator_rejects_full_fields() {
    let op = operator(DiracType::WilsonPc, MatPcType::EvenEven, DagType::No);
    let g = *op.geometry();
    let full = ColorSpinorField::random(g, 4, SiteSubset::Full, Precision::Double, 12);
    let mut half = op.create_spinor();
    let err = op.m(&mut half, &full).unwrap_err();
    assert!(
        matches!(err, DiracError::FieldMismatch { field: "in", property: "site subset", .. }),
        "{err}"
    );
    // Nothing was written.
    assert_eq!(half.norm_sq(), 0.0);
}

#[test]
fn full_operator_rejects_half_fields() {
    let op = operator(DiracType::Staggered, MatPcType::EvenEven, DagType::No);
    let g = *op.geometry();
    let half = ColorSpinorField::random(g, 1, SiteSubset::Parity, Precision::Double, 13);
    let mut out = op.create_spinor();
    assert!(matches!(
        op.dslash(&mut out, &half, Parity::Odd),
        Err(DiracError::FieldMismatch { .. })
    ));
}

#[test]
fn spin_and_precision_mismatches_are_reported() {
    let op = operator(DiracType::CloverPc, MatPcType::OddOdd, DagType::No);
    let g = *op.geometry();
    let mut out = op.create_spinor();

    let staggered = ColorSpinorField::random(g, 1, SiteSubset::Parity, Precision::Double, 14);
    assert!(matches!(
        op.m(&mut out, &staggered),
        Err(DiracError::FieldMismatch { property: "nspin", .. })
    ));

    let single = ColorSpinorField::random(g, 4, SiteSubset::Parity, Precision::Single, 15);
    assert!(matches!(
        op.m(&mut out, &single),
        Err(DiracError::FieldMismatch { property: "precision", .. })
    ));

    let other_lattice = LatticeGeometry::new([2, 2, 2, 2]).unwrap();
    let small = ColorSpinorField::random(
        other_lattice,
        4,
        SiteSubset::Parity,
        Precision::Double,
        16,
    );
    assert!(matches!(
        op.m(&mut out, &small),
        Err(DiracError::FieldMismatch { property: "extent", .. })
    ));
}

#[test]
fn shared_operator_serves_threads_concurrently() {
    let pool = Arc::new(ScratchPool::new());
    let op = DiracOperator::create(&DiracParam {
        scratch: Some(Arc::clone(&pool)),
        ..param(DiracType::WilsonPc, MatPcType::EvenEven, DagType::No)
    })
    .unwrap();
    let v = random_for(&op, 17);
    let mut expected = op.create_spinor();
    op.mdag_m(&mut expected, &v).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut out = op.create_spinor();
                for _ in 0..3 {
                    op.mdag_m(&mut out, &v).unwrap();
                    op.mdag(&mut out, &v).unwrap();
                    op.mdag_m(&mut out, &v).unwrap();
                    assert_eq!(out.max_abs_diff(&expected), 0.0);
                }
            });
        }
    });
    assert_eq!(op.dagger(), DagType::No);
    assert!(pool.idle() > 0);
}
