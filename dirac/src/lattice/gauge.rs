// SPDX-License-Identifier: AGPL-3.0-only

//! Background gauge fields: SU(3) links `U_μ(x)` on the full lattice.
//!
//! Links are stored as `links[site_index * 4 + mu]`. A field is shared
//! read-only between every operator built against it; nothing in the
//! operator layer mutates links.
//!
//! The fermion boundary condition in time is a property of the field: with
//! [`TimeBoundary::Antiperiodic`] every wrap around the time direction
//! picks up a factor −1.

use serde::{Deserialize, Serialize};

use super::constants::N_DIM;
use super::geometry::LatticeGeometry;
use super::su3::Su3Matrix;
use crate::error::{DiracError, DiracResult};

/// Fermion boundary condition in the time direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBoundary {
    Periodic,
    #[default]
    Antiperiodic,
}

/// Which role a link field plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Unsmeared links for Wilson-type operators.
    Thin,
    /// Smeared one-hop links for improved staggered operators.
    Fat,
    /// Three-hop (Naik) links for improved staggered operators.
    Long,
}

/// 4D lattice of SU(3) link variables.
#[derive(Clone, Debug)]
pub struct GaugeField {
    geometry: LatticeGeometry,
    links: Vec<Su3Matrix>,
    boundary: TimeBoundary,
    kind: LinkKind,
}

impl GaugeField {
    /// Wrap existing links.
    ///
    /// # Errors
    ///
    /// [`DiracError::Unsupported`] when the link count is not `4 × volume`.
    pub fn from_links(
        geometry: LatticeGeometry,
        links: Vec<Su3Matrix>,
        kind: LinkKind,
    ) -> DiracResult<Self> {
        let expected = geometry.volume() * N_DIM;
        if links.len() != expected {
            return Err(DiracError::unsupported(format!(
                "{kind:?} gauge field on {geometry} needs {expected} links, got {}",
                links.len()
            )));
        }
        Ok(Self {
            geometry,
            links,
            boundary: TimeBoundary::default(),
            kind,
        })
    }

    /// All links = identity (free field).
    #[must_use]
    pub fn cold_start(geometry: LatticeGeometry, kind: LinkKind) -> Self {
        Self {
            geometry,
            links: vec![Su3Matrix::IDENTITY; geometry.volume() * N_DIM],
            boundary: TimeBoundary::default(),
            kind,
        }
    }

    /// Random links near the identity with spread `epsilon`.
    #[must_use]
    pub fn hot_start(geometry: LatticeGeometry, kind: LinkKind, epsilon: f64, seed: u64) -> Self {
        let mut rng = seed;
        let links = (0..geometry.volume() * N_DIM)
            .map(|_| Su3Matrix::random_near_identity(&mut rng, epsilon))
            .collect();
        Self {
            geometry,
            links,
            boundary: TimeBoundary::default(),
            kind,
        }
    }

    /// Replace the time boundary condition.
    #[must_use]
    pub const fn with_boundary(mut self, boundary: TimeBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    #[must_use]
    pub const fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    #[must_use]
    pub const fn boundary(&self) -> TimeBoundary {
        self.boundary
    }

    #[must_use]
    pub const fn kind(&self) -> LinkKind {
        self.kind
    }

    /// Link `U_mu(x)`.
    #[inline]
    pub fn link(&self, x: [usize; N_DIM], mu: usize) -> &Su3Matrix {
        &self.links[self.geometry.site_index(x) * N_DIM + mu]
    }

    /// Sign picked up by a hop along `mu` that wrapped `wraps` times.
    #[inline]
    #[must_use]
    pub fn boundary_sign(&self, mu: usize, wraps: usize) -> f64 {
        if wraps % 2 == 1 && mu == N_DIM - 1 && self.boundary == TimeBoundary::Antiperiodic {
            -1.0
        } else {
            1.0
        }
    }
}
