// SPDX-License-Identifier: AGPL-3.0-only

//! 4D lattice geometry and checkerboard (even-odd) indexing.
//!
//! Sites are ordered lexicographically with x fastest:
//! `idx = ((t·Nz + z)·Ny + y)·Nx + x`, coordinates `[x, y, z, t]`.
//! A site's parity is `(x + y + z + t) mod 2`. With an even `Nx`, the two
//! sites `2i` and `2i + 1` always have opposite parity, so `idx / 2` is a
//! dense index within each parity class (the checkerboard index).
//!
//! Every extent must be even: the checkerboard then survives the periodic
//! wrap, so a hop across the boundary still lands on the opposite parity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::N_DIM;
use crate::error::{DiracError, DiracResult};

/// Checkerboard class of a lattice site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// The opposite class.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }

    /// 0 for even, 1 for odd.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Even => 0,
            Self::Odd => 1,
        }
    }

    /// Parity of a site from its coordinate sum.
    #[must_use]
    pub const fn of_site(x: [usize; N_DIM]) -> Self {
        if (x[0] + x[1] + x[2] + x[3]) % 2 == 0 {
            Self::Even
        } else {
            Self::Odd
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Even => write!(f, "even"),
            Self::Odd => write!(f, "odd"),
        }
    }
}

/// Extents of a 4D periodic lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LatticeGeometry {
    dims: [usize; N_DIM],
}

impl LatticeGeometry {
    /// Validate and build a geometry. All extents must be even and non-zero.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] for a zero or odd extent.
    pub fn new(dims: [usize; N_DIM]) -> DiracResult<Self> {
        if let Some(mu) = dims.iter().position(|&d| d == 0 || d % 2 != 0) {
            return Err(DiracError::unsupported(format!(
                "lattice extent {} in direction {mu} must be even and non-zero",
                dims[mu]
            )));
        }
        Ok(Self { dims })
    }

    /// Extents `[Nx, Ny, Nz, Nt]`.
    #[must_use]
    pub const fn dims(&self) -> [usize; N_DIM] {
        self.dims
    }

    /// Total number of lattice sites.
    #[must_use]
    pub const fn volume(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2] * self.dims[3]
    }

    /// Number of sites of one parity.
    #[must_use]
    pub const fn half_volume(&self) -> usize {
        self.volume() / 2
    }

    /// Linear site index of coordinates `[x, y, z, t]`.
    #[must_use]
    pub const fn site_index(&self, x: [usize; N_DIM]) -> usize {
        ((x[3] * self.dims[2] + x[2]) * self.dims[1] + x[1]) * self.dims[0] + x[0]
    }

    /// Coordinates of a linear site index.
    #[must_use]
    pub const fn site_coords(&self, idx: usize) -> [usize; N_DIM] {
        let x = idx % self.dims[0];
        let rest = idx / self.dims[0];
        let y = rest % self.dims[1];
        let rest = rest / self.dims[1];
        let z = rest % self.dims[2];
        let t = rest / self.dims[2];
        [x, y, z, t]
    }

    /// Index of a site within its parity class.
    #[must_use]
    pub const fn cb_index(&self, x: [usize; N_DIM]) -> usize {
        self.site_index(x) / 2
    }

    /// Coordinates of checkerboard site `cb` of the given parity.
    #[must_use]
    pub const fn cb_coords(&self, parity: Parity, cb: usize) -> [usize; N_DIM] {
        let x = self.site_coords(2 * cb);
        if Parity::of_site(x).index() == parity.index() {
            x
        } else {
            self.site_coords(2 * cb + 1)
        }
    }

    /// Site reached by `hops` steps along `mu`, with periodic wrap.
    ///
    /// Also returns how many times the step wrapped around the lattice, which
    /// the gauge field needs to apply its boundary condition. A Naik hop on an
    /// extent-2 direction can wrap twice.
    #[must_use]
    pub const fn shift(
        &self,
        x: [usize; N_DIM],
        mu: usize,
        hops: usize,
        forward: bool,
    ) -> ([usize; N_DIM], usize) {
        let n = self.dims[mu];
        let mut y = x;
        let wraps;
        if forward {
            wraps = (x[mu] + hops) / n;
            y[mu] = (x[mu] + hops) % n;
        } else {
            wraps = if x[mu] >= hops { 0 } else { (hops - x[mu] + n - 1) / n };
            y[mu] = (x[mu] + n * hops - hops) % n;
        }
        (y, wraps)
    }
}

impl fmt::Display for LatticeGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [nx, ny, nz, nt] = self.dims;
        write!(f, "{nx}x{ny}x{nz}x{nt}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_extent_rejected() {
        assert!(LatticeGeometry::new([4, 3, 4, 4]).is_err());
        assert!(LatticeGeometry::new([4, 4, 0, 4]).is_err());
        assert!(LatticeGeometry::new([2, 4, 6, 8]).is_ok());
    }

    #[test]
    fn site_index_roundtrip() {
        let g = LatticeGeometry::new([4, 6, 2, 8]).unwrap();
        for idx in 0..g.volume() {
            assert_eq!(g.site_index(g.site_coords(idx)), idx);
        }
    }

    #[test]
    fn checkerboard_index_is_dense_per_parity() {
        let g = LatticeGeometry::new([4, 4, 2, 2]).unwrap();
        for parity in [Parity::Even, Parity::Odd] {
            let mut seen = vec![false; g.half_volume()];
            for cb in 0..g.half_volume() {
                let x = g.cb_coords(parity, cb);
                assert_eq!(Parity::of_site(x), parity);
                assert_eq!(g.cb_index(x), cb);
                seen[cb] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn shift_wraps_and_flags_boundary() {
        let g = LatticeGeometry::new([4, 4, 4, 4]).unwrap();
        let (y, wraps) = g.shift([0, 0, 0, 3], 3, 1, true);
        assert_eq!(y, [0, 0, 0, 0]);
        assert_eq!(wraps, 1);
        let (y, wraps) = g.shift([0, 0, 0, 1], 3, 3, false);
        assert_eq!(y, [0, 0, 0, 2]);
        assert_eq!(wraps, 1);
        let (y, wraps) = g.shift([1, 0, 0, 0], 0, 1, false);
        assert_eq!(y, [0, 0, 0, 0]);
        assert_eq!(wraps, 0);
    }

    #[test]
    fn naik_hop_counts_double_wrap() {
        let g = LatticeGeometry::new([2, 2, 2, 2]).unwrap();
        assert_eq!(g.shift([0, 0, 0, 1], 3, 3, true), ([0, 0, 0, 0], 2));
        assert_eq!(g.shift([0, 0, 0, 0], 3, 3, false), ([0, 0, 0, 1], 2));
        assert_eq!(g.shift([0, 0, 0, 1], 3, 3, false), ([0, 0, 0, 0], 1));
    }

    #[test]
    fn neighbours_have_opposite_parity() {
        let g = LatticeGeometry::new([4, 4, 4, 4]).unwrap();
        let x = [3, 1, 0, 2];
        for mu in 0..N_DIM {
            for hops in [1, 3] {
                let (y, _) = g.shift(x, mu, hops, true);
                assert_eq!(Parity::of_site(y), Parity::of_site(x).other());
            }
        }
    }
}
