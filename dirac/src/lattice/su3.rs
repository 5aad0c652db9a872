// SPDX-License-Identifier: AGPL-3.0-only

//! SU(3) link matrices and colour vectors.
//!
//! Each link variable `U_μ(x)` is a 3×3 unitary matrix with determinant 1,
//! the parallel transporter from site x+μ back to site x. The stencil kernels
//! only ever need `U v` and `U† v` on a colour vector, so those are the hot
//! operations here; full matrix products exist for building test
//! configurations.
//!
//! Storage: row-major, 9 `Complex64` values.
//!
//! # References
//!
//! - Gattringer & Lang, "QCD on the Lattice" (2010), Ch. 2

use std::ops::Mul;

use num_complex::Complex64;

use super::constants::{lcg_gaussian, N_COLORS};

/// Colour vector at a single lattice site: 3 complex components.
pub type ColorVector = [Complex64; N_COLORS];

const C_ZERO: Complex64 = Complex64::new(0.0, 0.0);
const C_ONE: Complex64 = Complex64::new(1.0, 0.0);

/// 3×3 complex matrix, `m[row][col]`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[must_use]
pub struct Su3Matrix {
    /// Matrix elements m[row][col].
    pub m: [[Complex64; 3]; 3],
}

impl Mul for Su3Matrix {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = (0..3).map(|k| self.m[i][k] * rhs.m[k][j]).sum();
            }
        }
        r
    }
}

impl Su3Matrix {
    /// 3×3 identity matrix.
    pub const IDENTITY: Self = Self {
        m: [
            [C_ONE, C_ZERO, C_ZERO],
            [C_ZERO, C_ONE, C_ZERO],
            [C_ZERO, C_ZERO, C_ONE],
        ],
    };

    /// Zero matrix.
    pub const ZERO: Self = Self {
        m: [[C_ZERO; 3]; 3],
    };

    /// Conjugate transpose.
    pub fn adjoint(self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = self.m[j][i].conj();
            }
        }
        r
    }

    /// Scale by a real number.
    pub fn scale(self, s: f64) -> Self {
        let mut r = self;
        for row in &mut r.m {
            for c in row.iter_mut() {
                *c *= s;
            }
        }
        r
    }

    /// `U v`
    #[inline]
    #[must_use]
    pub fn mul_vec(&self, v: &ColorVector) -> ColorVector {
        let mut out = [C_ZERO; 3];
        for (row, o) in self.m.iter().zip(out.iter_mut()) {
            *o = row[0] * v[0] + row[1] * v[1] + row[2] * v[2];
        }
        out
    }

    /// `U† v` without forming the adjoint.
    #[inline]
    #[must_use]
    pub fn adjoint_mul_vec(&self, v: &ColorVector) -> ColorVector {
        let mut out = [C_ZERO; 3];
        for (c, o) in out.iter_mut().enumerate() {
            *o = self.m[0][c].conj() * v[0]
                + self.m[1][c].conj() * v[1]
                + self.m[2][c].conj() * v[2];
        }
        out
    }

    /// Determinant.
    #[must_use]
    pub fn det(self) -> Complex64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Project back onto SU(3) by Gram-Schmidt on the first two rows; the
    /// third row is the conjugated cross product so that det = 1.
    pub fn reunitarize(self) -> Self {
        let mut u = self;
        normalize_row(&mut u, 0);

        let dot01: Complex64 = (0..3).map(|j| u.m[0][j].conj() * u.m[1][j]).sum();
        for j in 0..3 {
            let r0 = u.m[0][j];
            u.m[1][j] -= r0 * dot01;
        }
        normalize_row(&mut u, 1);

        u.m[2][0] = (u.m[0][1] * u.m[1][2] - u.m[0][2] * u.m[1][1]).conj();
        u.m[2][1] = (u.m[0][2] * u.m[1][0] - u.m[0][0] * u.m[1][2]).conj();
        u.m[2][2] = (u.m[0][0] * u.m[1][1] - u.m[0][1] * u.m[1][0]).conj();
        u
    }

    /// Random SU(3) matrix near the identity: exp(iεH) to second order for a
    /// random traceless Hermitian H, reunitarized.
    pub fn random_near_identity(seed: &mut u64, epsilon: f64) -> Self {
        let sqrt3 = 3.0_f64.sqrt();
        let mut h = [[C_ZERO; 3]; 3];

        let a3 = lcg_gaussian(seed) * epsilon;
        let a8 = lcg_gaussian(seed) * epsilon;
        h[0][0] = Complex64::new(a3 + a8 / sqrt3, 0.0);
        h[1][1] = Complex64::new(-a3 + a8 / sqrt3, 0.0);
        h[2][2] = Complex64::new(-2.0 * a8 / sqrt3, 0.0);
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let re = lcg_gaussian(seed) * epsilon;
            let im = lcg_gaussian(seed) * epsilon;
            h[i][j] = Complex64::new(re, im);
            h[j][i] = Complex64::new(re, -im);
        }

        let mut result = Self::IDENTITY;
        for i in 0..3 {
            for j in 0..3 {
                let h2: Complex64 = (0..3).map(|k| h[i][k] * h[k][j]).sum();
                result.m[i][j] += Complex64::i() * h[i][j] - h2 * 0.5;
            }
        }
        result.reunitarize()
    }
}

fn normalize_row(u: &mut Su3Matrix, row: usize) {
    let norm = u.m[row].iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > super::constants::LATTICE_DIVISION_GUARD {
        for c in &mut u.m[row] {
            *c /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_link_is_unitary() {
        let mut seed = 123u64;
        let u = Su3Matrix::random_near_identity(&mut seed, 0.7);
        let prod = u * u.adjoint();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod.m[i][j].re - expected).abs() < 1e-12);
                assert!(prod.m[i][j].im.abs() < 1e-12);
            }
        }
        assert!((u.det() - C_ONE).norm() < 1e-12, "det = {}", u.det());
    }

    #[test]
    fn adjoint_mul_vec_matches_explicit_adjoint() {
        let mut seed = 9u64;
        let u = Su3Matrix::random_near_identity(&mut seed, 1.2);
        let v = [
            Complex64::new(0.3, -0.1),
            Complex64::new(-1.0, 0.25),
            Complex64::new(0.5, 0.5),
        ];
        let a = u.adjoint_mul_vec(&v);
        let b = u.adjoint().mul_vec(&v);
        for c in 0..3 {
            assert!((a[c] - b[c]).norm() < 1e-14);
        }
    }

    #[test]
    fn identity_mul_vec_is_identity() {
        let v = [C_ONE, Complex64::new(0.0, 2.0), Complex64::new(-3.0, 0.0)];
        assert_eq!(Su3Matrix::IDENTITY.mul_vec(&v), v);
    }
}
