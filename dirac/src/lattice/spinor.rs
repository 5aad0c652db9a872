// SPDX-License-Identifier: AGPL-3.0-only

//! Colour-spinor fields on the full lattice or on one checkerboard.
//!
//! A parity field stores `half_volume` sites, site `cb` occupying
//! `data[cb·nspin·3 .. (cb+1)·nspin·3]` with spin outer and colour inner.
//! A full field is exactly two parity fields, even then odd, so an
//! even-odd operator can borrow either half without copying.
//!
//! A parity field does not record which checkerboard it holds: the parity
//! is a property of how the operator uses it, passed alongside. This lets a
//! solver keep its source in one half of a full solution vector while the
//! preconditioned system is solved in the other.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::constants::{lcg_gaussian, N_COLORS};
use super::geometry::{LatticeGeometry, Parity};
use crate::error::{DiracError, DiracResult};

/// Whether a field covers the whole lattice or a single checkerboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteSubset {
    Full,
    Parity,
}

/// Storage precision tag.
///
/// Arithmetic is always done in f64; the tag is carried so that operators
/// and fields built for different precisions are not silently mixed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Double,
    Single,
    Half,
}

/// Everything two fields must agree on to be combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldShape {
    pub geometry: LatticeGeometry,
    pub nspin: usize,
    pub subset: SiteSubset,
    pub precision: Precision,
}

#[derive(Clone, Debug)]
enum Storage {
    Parity(Vec<Complex64>),
    Full(Box<[ColorSpinorField; 2]>),
}

/// Colour-spinor field with `nspin` spin components per site.
#[derive(Clone, Debug)]
pub struct ColorSpinorField {
    geometry: LatticeGeometry,
    nspin: usize,
    precision: Precision,
    storage: Storage,
}

impl ColorSpinorField {
    /// Zero field.
    #[must_use]
    pub fn zeros(
        geometry: LatticeGeometry,
        nspin: usize,
        subset: SiteSubset,
        precision: Precision,
    ) -> Self {
        let storage = match subset {
            SiteSubset::Parity => {
                let len = geometry.half_volume() * nspin * N_COLORS;
                Storage::Parity(vec![Complex64::new(0.0, 0.0); len])
            }
            SiteSubset::Full => {
                let half = Self::zeros(geometry, nspin, SiteSubset::Parity, precision);
                Storage::Full(Box::new([half.clone(), half]))
            }
        };
        Self {
            geometry,
            nspin,
            precision,
            storage,
        }
    }

    /// Gaussian random field, reproducible from `seed`.
    #[must_use]
    pub fn random(
        geometry: LatticeGeometry,
        nspin: usize,
        subset: SiteSubset,
        precision: Precision,
        seed: u64,
    ) -> Self {
        let mut field = Self::zeros(geometry, nspin, subset, precision);
        let mut rng = seed;
        for z in field.flat_mut() {
            *z = Complex64::new(lcg_gaussian(&mut rng), lcg_gaussian(&mut rng));
        }
        field
    }

    /// Zero field with the same shape.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.geometry, self.nspin, self.subset(), self.precision)
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
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    #[must_use]
    pub const fn subset(&self) -> SiteSubset {
        match self.storage {
            Storage::Parity(_) => SiteSubset::Parity,
            Storage::Full(_) => SiteSubset::Full,
        }
    }

    #[must_use]
    pub const fn shape(&self) -> FieldShape {
        FieldShape {
            geometry: self.geometry,
            nspin: self.nspin,
            subset: self.subset(),
            precision: self.precision,
        }
    }

    /// Complex components per site.
    #[must_use]
    pub const fn site_len(&self) -> usize {
        self.nspin * N_COLORS
    }

    /// Lattice sites covered by this field.
    #[must_use]
    pub const fn sites(&self) -> usize {
        match self.storage {
            Storage::Parity(_) => self.geometry.half_volume(),
            Storage::Full(_) => self.geometry.volume(),
        }
    }

    /// One checkerboard of a full field.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] on a parity field.
    pub fn half(&self, parity: Parity) -> DiracResult<&Self> {
        match &self.storage {
            Storage::Full(h) => Ok(&h[parity.index()]),
            Storage::Parity(_) => Err(not_full()),
        }
    }

    /// Mutable checkerboard of a full field.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] on a parity field.
    pub fn half_mut(&mut self, parity: Parity) -> DiracResult<&mut Self> {
        match &mut self.storage {
            Storage::Full(h) => Ok(&mut h[parity.index()]),
            Storage::Parity(_) => Err(not_full()),
        }
    }

    /// Both halves of a full field: `(parity, parity.other())`.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] on a parity field.
    pub fn split_mut(&mut self, parity: Parity) -> DiracResult<(&mut Self, &mut Self)> {
        match &mut self.storage {
            Storage::Full(h) => {
                let [even, odd] = &mut **h;
                Ok(match parity {
                    Parity::Even => (even, odd),
                    Parity::Odd => (odd, even),
                })
            }
            Storage::Parity(_) => Err(not_full()),
        }
    }

    /// Raw components of a parity field.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] on a full field.
    pub fn data(&self) -> DiracResult<&[Complex64]> {
        match &self.storage {
            Storage::Parity(v) => Ok(v),
            Storage::Full(_) => Err(not_parity()),
        }
    }

    /// Mutable raw components of a parity field.
    ///
    /// # Errors
    ///
    /// [`DiracError::FieldMismatch`] on a full field.
    pub fn data_mut(&mut self) -> DiracResult<&mut [Complex64]> {
        match &mut self.storage {
            Storage::Parity(v) => Ok(v),
            Storage::Full(_) => Err(not_parity()),
        }
    }

    fn flat(&self) -> Box<dyn Iterator<Item = &Complex64> + '_> {
        match &self.storage {
            Storage::Parity(v) => Box::new(v.iter()),
            Storage::Full(h) => Box::new(h[0].flat().chain(h[1].flat())),
        }
    }

    fn flat_mut(&mut self) -> Box<dyn Iterator<Item = &mut Complex64> + '_> {
        match &mut self.storage {
            Storage::Parity(v) => Box::new(v.iter_mut()),
            Storage::Full(h) => {
                let [even, odd] = &mut **h;
                Box::new(even.flat_mut().chain(odd.flat_mut()))
            }
        }
    }

    // Linear algebra. Callers guarantee matching shapes; the operator layer
    // checks them before any of these run.

    /// `<self|other>`, conjugate-linear in `self`.
    #[must_use]
    pub fn dot(&self, other: &Self) -> Complex64 {
        debug_assert_eq!(self.shape(), other.shape());
        self.flat().zip(other.flat()).map(|(a, b)| a.conj() * b).sum()
    }

    #[must_use]
    pub fn norm_sq(&self) -> f64 {
        self.flat().map(Complex64::norm_sqr).sum()
    }

    /// `self += a·x`
    pub fn axpy(&mut self, a: f64, x: &Self) {
        debug_assert_eq!(self.shape(), x.shape());
        for (o, xi) in self.flat_mut().zip(x.flat()) {
            *o = *o + *xi * a;
        }
    }

    /// `self = x + a·self`
    pub fn xpay(&mut self, x: &Self, a: f64) {
        debug_assert_eq!(self.shape(), x.shape());
        for (o, xi) in self.flat_mut().zip(x.flat()) {
            *o = *xi + *o * a;
        }
    }

    pub fn scale(&mut self, a: f64) {
        for o in self.flat_mut() {
            *o *= a;
        }
    }

    pub fn zero(&mut self) {
        for o in self.flat_mut() {
            *o = Complex64::new(0.0, 0.0);
        }
    }

    pub fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.shape(), other.shape());
        for (o, x) in self.flat_mut().zip(other.flat()) {
            *o = *x;
        }
    }

    /// Largest component-wise distance to `other`.
    #[must_use]
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.flat()
            .zip(other.flat())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }
}

fn not_full() -> DiracError {
    DiracError::mismatch("spinor", "site subset", "full", "parity")
}

fn not_parity() -> DiracError {
    DiracError::mismatch("spinor", "site subset", "parity", "full")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::constants::WILSON_NSPIN;

    fn geometry() -> LatticeGeometry {
        LatticeGeometry::new([4, 2, 2, 2]).unwrap()
    }

    #[test]
    fn full_field_is_two_halves() {
        let f = ColorSpinorField::random(
            geometry(),
            WILSON_NSPIN,
            SiteSubset::Full,
            Precision::Double,
            1,
        );
        let even = f.half(Parity::Even).unwrap();
        let odd = f.half(Parity::Odd).unwrap();
        assert_eq!(even.sites() + odd.sites(), f.sites());
        let total = even.norm_sq() + odd.norm_sq();
        assert!((total - f.norm_sq()).abs() < 1e-12 * total);
    }

    #[test]
    fn parity_field_has_no_halves() {
        let mut f = ColorSpinorField::zeros(geometry(), 1, SiteSubset::Parity, Precision::Double);
        assert!(f.half(Parity::Even).is_err());
        assert!(f.split_mut(Parity::Odd).is_err());
        assert!(f.data_mut().is_ok());
    }

    #[test]
    fn split_mut_orders_requested_parity_first() {
        let mut f = ColorSpinorField::zeros(geometry(), 1, SiteSubset::Full, Precision::Double);
        {
            let (odd, _) = f.split_mut(Parity::Odd).unwrap();
            odd.data_mut().unwrap()[0] = Complex64::new(2.0, 0.0);
        }
        assert_eq!(f.half(Parity::Odd).unwrap().data().unwrap()[0], Complex64::new(2.0, 0.0));
        assert_eq!(f.half(Parity::Even).unwrap().norm_sq(), 0.0);
    }

    #[test]
    fn axpy_and_xpay() {
        let g = geometry();
        let x = ColorSpinorField::random(g, 1, SiteSubset::Parity, Precision::Double, 3);
        let mut y = ColorSpinorField::random(g, 1, SiteSubset::Parity, Precision::Double, 4);
        let y0 = y.clone();

        y.axpy(2.0, &x);
        y.axpy(-2.0, &x);
        assert!(y.max_abs_diff(&y0) < 1e-13);

        // y = x + 0·y
        y.xpay(&x, 0.0);
        assert_eq!(y.max_abs_diff(&x), 0.0);
    }

    #[test]
    fn dot_is_hermitian() {
        let g = geometry();
        let a = ColorSpinorField::random(g, 4, SiteSubset::Full, Precision::Double, 5);
        let b = ColorSpinorField::random(g, 4, SiteSubset::Full, Precision::Double, 6);
        let ab = a.dot(&b);
        let ba = b.dot(&a);
        assert!((ab - ba.conj()).norm() < 1e-12);
        assert!((a.dot(&a).re - a.norm_sq()).abs() < 1e-12 * a.norm_sq());
    }
}
