// SPDX-License-Identifier: AGPL-3.0-only

//! Field validation.
//!
//! Every public operator entry point runs one of these before touching any
//! data, so a mismatch never leaves a partially written output.
//! Properties are checked in order: site subset, extent, spin count,
//! precision. The first disagreement is reported.

use super::DiracBase;
use crate::error::{DiracError, DiracResult};
use crate::lattice::spinor::{ColorSpinorField, SiteSubset};

/// `out` and `in` must be single-parity fields matching the operator.
///
/// # Errors
///
/// [`DiracError::FieldMismatch`] naming the first offending field and property.
pub fn check_parity_spinor(
    base: &DiracBase,
    out: &ColorSpinorField,
    input: &ColorSpinorField,
) -> DiracResult<()> {
    check_field(base, SiteSubset::Parity, "out", out)?;
    check_field(base, SiteSubset::Parity, "in", input)
}

/// `out` and `in` must be full-lattice fields matching the operator.
///
/// # Errors
///
/// [`DiracError::FieldMismatch`] naming the first offending field and property.
pub fn check_full_spinor(
    base: &DiracBase,
    out: &ColorSpinorField,
    input: &ColorSpinorField,
) -> DiracResult<()> {
    check_field(base, SiteSubset::Full, "out", out)?;
    check_field(base, SiteSubset::Full, "in", input)
}

/// Third field of a fused `+ k·x` application.
///
/// # Errors
///
/// [`DiracError::FieldMismatch`] if `x` disagrees with the operator.
pub fn check_xpay_spinor(
    base: &DiracBase,
    subset: SiteSubset,
    x: &ColorSpinorField,
) -> DiracResult<()> {
    check_field(base, subset, "x", x)
}

pub(crate) fn check_field(
    base: &DiracBase,
    subset: SiteSubset,
    role: &'static str,
    field: &ColorSpinorField,
) -> DiracResult<()> {
    if field.subset() != subset {
        return Err(DiracError::mismatch(
            role,
            "site subset",
            format!("{subset:?}"),
            format!("{:?}", field.subset()),
        ));
    }
    if field.geometry() != base.geometry() {
        return Err(DiracError::mismatch(role, "extent", base.geometry(), field.geometry()));
    }
    if field.nspin() != base.nspin() {
        return Err(DiracError::mismatch(role, "nspin", base.nspin(), field.nspin()));
    }
    if field.precision() != base.precision() {
        return Err(DiracError::mismatch(
            role,
            "precision",
            format!("{:?}", base.precision()),
            format!("{:?}", field.precision()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::geometry::LatticeGeometry;
    use crate::lattice::spinor::Precision;
    use crate::operator::param::{DagType, DiracParam, MatPcType};

    fn base() -> DiracBase {
        let param = DiracParam {
            kappa: 0.1,
            matpc: MatPcType::EvenEven,
            dagger: DagType::No,
            ..DiracParam::default()
        };
        DiracBase::new(&param, LatticeGeometry::new([2, 2, 2, 4]).unwrap(), 4)
    }

    fn field(
        dims: [usize; 4],
        nspin: usize,
        subset: SiteSubset,
        precision: Precision,
    ) -> ColorSpinorField {
        ColorSpinorField::zeros(LatticeGeometry::new(dims).unwrap(), nspin, subset, precision)
    }

    fn property(err: DiracError) -> (&'static str, &'static str) {
        match err {
            DiracError::FieldMismatch { field, property, .. } => (field, property),
            other => panic!("expected FieldMismatch, got {other}"),
        }
    }

    #[test]
    fn matching_fields_pass() {
        let b = base();
        let f = field([2, 2, 2, 4], 4, SiteSubset::Parity, Precision::Double);
        assert!(check_parity_spinor(&b, &f, &f).is_ok());
    }

    #[test]
    fn reports_first_offending_field_and_property() {
        let b = base();
        let good = field([2, 2, 2, 4], 4, SiteSubset::Parity, Precision::Double);
        let full = field([2, 2, 2, 4], 4, SiteSubset::Full, Precision::Double);
        let wrong_extent = field([2, 2, 4, 4], 4, SiteSubset::Parity, Precision::Double);
        let staggered = field([2, 2, 2, 4], 1, SiteSubset::Parity, Precision::Double);
        let single = field([2, 2, 2, 4], 4, SiteSubset::Parity, Precision::Single);

        let parity = |out: &ColorSpinorField, input: &ColorSpinorField| {
            property(check_parity_spinor(&b, out, input).unwrap_err())
        };
        assert_eq!(parity(&good, &full), ("in", "site subset"));
        assert_eq!(parity(&wrong_extent, &good), ("out", "extent"));
        assert_eq!(parity(&good, &staggered), ("in", "nspin"));
        assert_eq!(parity(&single, &good), ("out", "precision"));
        assert_eq!(
            property(check_full_spinor(&b, &good, &good).unwrap_err()),
            ("out", "site subset")
        );
        assert_eq!(
            property(check_xpay_spinor(&b, SiteSubset::Parity, &full).unwrap_err()),
            ("x", "site subset")
        );
    }
}
