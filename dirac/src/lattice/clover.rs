// SPDX-License-Identifier: AGPL-3.0-only

//! Clover term storage and per-site inversion.
//!
//! The clover term `A(x) = 1 + (c_sw κ / 2) σ_μν F_μν(x)` is a Hermitian
//! 12×12 matrix at every site. In the chiral (DeGrand-Rossi) basis, γ5 is
//! diagonal and `σ_μν` commutes with it, so `A(x)` splits into two Hermitian
//! 6×6 blocks: spins {0, 1} and spins {2, 3}, each with 3 colours. Within a
//! block the row index is `(spin mod 2) · 3 + colour`.
//!
//! Building `A` from the gauge field is the job of whoever owns the clover
//! construction; this module only stores blocks, applies them, and computes
//! the inverse needed by even-odd preconditioning.

use num_complex::Complex64;

use super::constants::{lcg_gaussian, CLOVER_BLOCK, CLOVER_PIVOT_GUARD};
use super::geometry::LatticeGeometry;
use crate::error::{DiracError, DiracResult};

/// One chiral block of the clover term.
pub type CloverBlock = [[Complex64; CLOVER_BLOCK]; CLOVER_BLOCK];

const C_ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Identity 6×6 block.
pub const CLOVER_IDENTITY: CloverBlock = {
    let mut b = [[C_ZERO; CLOVER_BLOCK]; CLOVER_BLOCK];
    let mut i = 0;
    while i < CLOVER_BLOCK {
        b[i][i] = Complex64::new(1.0, 0.0);
        i += 1;
    }
    b
};

/// Site-diagonal clover matrix (or its inverse) on the full lattice.
#[derive(Clone, Debug)]
pub struct CloverField {
    geometry: LatticeGeometry,
    /// `blocks[site_index] = [chirality +, chirality −]`
    blocks: Vec<[CloverBlock; 2]>,
}

impl CloverField {
    /// Wrap precomputed blocks, one pair per site in lexicographic order.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] when the block count does not match the volume.
    pub fn from_blocks(
        geometry: LatticeGeometry,
        blocks: Vec<[CloverBlock; 2]>,
    ) -> DiracResult<Self> {
        if blocks.len() != geometry.volume() {
            return Err(DiracError::unsupported(format!(
                "clover field on {geometry} needs {} sites, got {}",
                geometry.volume(),
                blocks.len()
            )));
        }
        Ok(Self { geometry, blocks })
    }

    /// `A = 1` everywhere; the clover operator then reduces to Wilson.
    #[must_use]
    pub fn identity(geometry: LatticeGeometry) -> Self {
        Self {
            geometry,
            blocks: vec![[CLOVER_IDENTITY; 2]; geometry.volume()],
        }
    }

    /// `A = 1 + strength · R` with R a random Hermitian block per site.
    ///
    /// Stands in for a real clover construction when exercising operators:
    /// for `strength` well below 1/6 the blocks are positive definite.
    #[must_use]
    pub fn random(geometry: LatticeGeometry, strength: f64, seed: u64) -> Self {
        let mut rng = seed;
        let hermitian = |rng: &mut u64| {
            let mut b = CLOVER_IDENTITY;
            for i in 0..CLOVER_BLOCK {
                b[i][i] += lcg_gaussian(rng) * strength;
                for j in (i + 1)..CLOVER_BLOCK {
                    let z = Complex64::new(lcg_gaussian(rng), lcg_gaussian(rng)) * strength;
                    b[i][j] = z;
                    b[j][i] = z.conj();
                }
            }
            b
        };
        let blocks = (0..geometry.volume())
            .map(|_| [hermitian(&mut rng), hermitian(&mut rng)])
            .collect();
        Self { geometry, blocks }
    }

    /// Site-by-site inverse.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] if any block is numerically singular.
    pub fn inverse(&self) -> DiracResult<Self> {
        let blocks = self
            .blocks
            .iter()
            .enumerate()
            .map(|(site, pair)| {
                let plus = invert_block(&pair[0]);
                let minus = invert_block(&pair[1]);
                match (plus, minus) {
                    (Some(p), Some(m)) => Ok([p, m]),
                    _ => Err(DiracError::unsupported(format!(
                        "clover term is singular at site {:?}",
                        self.geometry.site_coords(site)
                    ))),
                }
            })
            .collect::<DiracResult<Vec<_>>>()?;
        Ok(Self {
            geometry: self.geometry,
            blocks,
        })
    }

    #[must_use]
    pub const fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    /// Both chiral blocks at a lexicographic site index.
    #[inline]
    #[must_use]
    pub fn site(&self, idx: usize) -> &[CloverBlock; 2] {
        &self.blocks[idx]
    }
}

/// `B v` for one 6-component chiral half-spinor.
#[inline]
#[must_use]
pub fn apply_block(b: &CloverBlock, v: &[Complex64; CLOVER_BLOCK]) -> [Complex64; CLOVER_BLOCK] {
    let mut out = [C_ZERO; CLOVER_BLOCK];
    for (row, o) in b.iter().zip(out.iter_mut()) {
        *o = row.iter().zip(v.iter()).map(|(a, x)| a * x).sum();
    }
    out
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert_block(a: &CloverBlock) -> Option<CloverBlock> {
    let mut m = *a;
    let mut inv = CLOVER_IDENTITY;
    for col in 0..CLOVER_BLOCK {
        let pivot = (col..CLOVER_BLOCK).max_by(|&i, &j| {
            m[i][col]
                .norm_sqr()
                .total_cmp(&m[j][col].norm_sqr())
        })?;
        if m[pivot][col].norm_sqr() < CLOVER_PIVOT_GUARD {
            return None;
        }
        m.swap(col, pivot);
        inv.swap(col, pivot);

        let p = m[col][col].inv();
        for j in 0..CLOVER_BLOCK {
            m[col][j] *= p;
            inv[col][j] *= p;
        }
        for row in 0..CLOVER_BLOCK {
            if row == col {
                continue;
            }
            let f = m[row][col];
            for j in 0..CLOVER_BLOCK {
                let (mc, ic) = (m[col][j], inv[col][j]);
                m[row][j] -= f * mc;
                inv[row][j] -= f * ic;
            }
        }
    }
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerances::CLOVER_INVERSE_ABS;

    fn product(a: &CloverBlock, b: &CloverBlock) -> CloverBlock {
        let mut r = [[C_ZERO; CLOVER_BLOCK]; CLOVER_BLOCK];
        for i in 0..CLOVER_BLOCK {
            for j in 0..CLOVER_BLOCK {
                r[i][j] = (0..CLOVER_BLOCK).map(|k| a[i][k] * b[k][j]).sum();
            }
        }
        r
    }

    #[test]
    fn inverse_times_clover_is_identity() {
        let g = LatticeGeometry::new([2, 2, 2, 2]).unwrap();
        let clover = CloverField::random(g, 0.1, 5);
        let inv = clover.inverse().unwrap();
        for site in 0..g.volume() {
            for chi in 0..2 {
                let p = product(&clover.site(site)[chi], &inv.site(site)[chi]);
                for i in 0..CLOVER_BLOCK {
                    for j in 0..CLOVER_BLOCK {
                        let expected = if i == j { 1.0 } else { 0.0 };
                        assert!(
                            (p[i][j] - Complex64::new(expected, 0.0)).norm() < CLOVER_INVERSE_ABS,
                            "A·A⁻¹ off identity at site {site} ({i},{j})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn random_blocks_are_hermitian() {
        let g = LatticeGeometry::new([2, 2, 2, 2]).unwrap();
        let clover = CloverField::random(g, 0.2, 17);
        let b = &clover.site(3)[1];
        for i in 0..CLOVER_BLOCK {
            for j in 0..CLOVER_BLOCK {
                assert_eq!(b[i][j], b[j][i].conj());
            }
        }
    }

    #[test]
    fn singular_block_is_rejected() {
        let g = LatticeGeometry::new([2, 2, 2, 2]).unwrap();
        let mut blocks = vec![[CLOVER_IDENTITY; 2]; g.volume()];
        blocks[5][0] = [[C_ZERO; CLOVER_BLOCK]; CLOVER_BLOCK];
        let clover = CloverField::from_blocks(g, blocks).unwrap();
        assert!(matches!(clover.inverse(), Err(DiracError::Unsupported(_))));
    }
}
