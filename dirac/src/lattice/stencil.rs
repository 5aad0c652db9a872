// SPDX-License-Identifier: AGPL-3.0-only

//! CPU reference stencil kernels.
//!
//! Every kernel fills one checkerboard of a parity field and returns the flop
//! count of the call. Hopping kernels read the opposite checkerboard of their
//! input; the clover kernel is site-diagonal and reads the same one.
//!
//! Output sites are independent, so each kernel is a `rayon` parallel loop
//! over output sites with no shared mutable state.
//!
//! # Conventions
//!
//! Wilson hopping, applied to the site x of parity `parity`:
//!
//! ```text
//! D_W ψ(x) = Σ_μ (1 − γ_μ) U_μ(x) ψ(x+μ) + (1 + γ_μ) U_μ†(x−μ) ψ(x−μ)
//! ```
//!
//! The dagger flips both projector signs. Gamma matrices are in the
//! DeGrand-Rossi chiral basis with γ5 = diag(1, 1, −1, −1).
//!
//! Improved staggered hopping with fat links F and long (Naik) links L:
//!
//! ```text
//! D_s χ(x) = Σ_μ η_μ(x) [ F_μ(x) χ(x+μ) − F_μ†(x−μ) χ(x−μ)
//!                       + L_μ(x) χ(x+3μ) − L_μ†(x−3μ) χ(x−3μ) ]
//! ```
//!
//! with `η_μ(x) = (−1)^(x_0 + … + x_{μ−1})`. Naive staggered hopping drops
//! the L terms and takes thin links for F. `D_s` is anti-Hermitian, so its
//! dagger is `−D_s`.
//!
//! Operands are checked at entry: `out`, `in` and `x` must be parity fields
//! on the links' lattice with the kernel's spin count and one precision.
//!
//! All kernels compute `coeff · (hopping term)` and, when an `xpay` pair
//! `(x, k)` is given, add `k · x` in the same sweep. The fused result is
//! bit-identical to a separate `axpy(k, x)` after the unfused kernel.

use num_complex::Complex64;
use rayon::prelude::*;

use super::clover::{apply_block, CloverField};
use super::constants::{
    CLOVER_BLOCK, CLOVER_FLOPS, NAIK_HOP, NAIVE_STAGGERED_DSLASH_FLOPS, N_COLORS, N_DIM,
    STAGGERED_DSLASH_FLOPS, STAGGERED_NSPIN, WILSON_DSLASH_FLOPS, WILSON_NSPIN,
    XPAY_FLOPS_PER_COMPONENT,
};
use super::gauge::GaugeField;
use super::geometry::{LatticeGeometry, Parity};
use super::spinor::{ColorSpinorField, SiteSubset};
use super::su3::ColorVector;
use crate::error::{DiracError, DiracResult};

const C_ZERO: Complex64 = Complex64::new(0.0, 0.0);
const C_ONE: Complex64 = Complex64::new(1.0, 0.0);
const C_MINUS_ONE: Complex64 = Complex64::new(-1.0, 0.0);
const C_I: Complex64 = Complex64::new(0.0, 1.0);
const C_MINUS_I: Complex64 = Complex64::new(0.0, -1.0);

const WILSON_SITE: usize = WILSON_NSPIN * N_COLORS;
const STAGGERED_SITE: usize = STAGGERED_NSPIN * N_COLORS;

/// `GAMMA[mu][row] = (col, value)`: the single non-zero of each row of γ_μ.
pub const GAMMA: [[(usize, Complex64); WILSON_NSPIN]; N_DIM] = [
    [(3, C_I), (2, C_I), (1, C_MINUS_I), (0, C_MINUS_I)],
    [(3, C_MINUS_ONE), (2, C_ONE), (1, C_ONE), (0, C_MINUS_ONE)],
    [(2, C_I), (3, C_MINUS_I), (0, C_MINUS_I), (1, C_I)],
    [(2, C_ONE), (3, C_ONE), (0, C_ONE), (1, C_ONE)],
];

/// γ5 is diagonal in the chiral basis.
pub const GAMMA5_DIAG: [f64; WILSON_NSPIN] = [1.0, 1.0, -1.0, -1.0];

type Xpay<'a> = Option<(&'a ColorSpinorField, f64)>;

/// Wilson hopping term: `out = coeff · D_W in (+ k·x)`.
///
/// `out` receives parity `parity`; `in` holds the opposite parity.
///
/// # Errors
///
/// [`DiracError::FieldMismatch`] if an operand is a full field, lives on
/// another lattice, is not a 4-spin field, or disagrees with `out` in
/// precision.
pub fn wilson_hop(
    out: &mut ColorSpinorField,
    gauge: &GaugeField,
    input: &ColorSpinorField,
    parity: Parity,
    dagger: bool,
    coeff: f64,
    xpay: Xpay<'_>,
) -> DiracResult<u64> {
    let geometry = *gauge.geometry();
    check_operands(&geometry, WILSON_NSPIN, out, input, xpay)?;
    let src = input.data()?;
    let xs = xpay.map(|(x, k)| x.data().map(|d| (d, k))).transpose()?;
    // Non-dagger: (1 − γ) forward, (1 + γ) backward.
    let fwd_proj = if dagger { 1.0 } else { -1.0 };

    out.data_mut()?
        .par_chunks_mut(WILSON_SITE)
        .enumerate()
        .for_each(|(cb, site)| {
            let x = geometry.cb_coords(parity, cb);
            let mut acc = [C_ZERO; WILSON_SITE];
            for mu in 0..N_DIM {
                let (y, wraps) = geometry.shift(x, mu, 1, true);
                let u = gauge.link(x, mu);
                let t = transport(wilson_site(src, geometry.cb_index(y)), |v| u.mul_vec(v));
                project_accumulate(&mut acc, mu, fwd_proj, gauge.boundary_sign(mu, wraps), &t);

                let (y, wraps) = geometry.shift(x, mu, 1, false);
                let u = gauge.link(y, mu);
                let t = transport(wilson_site(src, geometry.cb_index(y)), |v| {
                    u.adjoint_mul_vec(v)
                });
                project_accumulate(&mut acc, mu, -fwd_proj, gauge.boundary_sign(mu, wraps), &t);
            }
            let x_site = xs.map(|(d, k)| (&d[cb * WILSON_SITE..(cb + 1) * WILSON_SITE], k));
            write_site(site, &acc, coeff, x_site);
        });

    Ok(site_flops(WILSON_DSLASH_FLOPS, WILSON_SITE, xpay.is_some()) * half_volume(out))
}

/// Staggered hopping term: `out = ±coeff · D_s in (+ k·x)`.
///
/// The sign is `−` when `dagger` is set. With `long = None` only the one-hop
/// term is applied (naive staggered).
///
/// # Errors
///
/// [`DiracError::FieldMismatch`] if an operand is a full field, lives on
/// another lattice, is not a 1-spin field, or disagrees with `out` in
/// precision; [`DiracError::Unsupported`] if the long links live on another
/// lattice than the one-hop links.
#[allow(clippy::too_many_arguments)]
pub fn staggered_hop(
    out: &mut ColorSpinorField,
    fat: &GaugeField,
    long: Option<&GaugeField>,
    input: &ColorSpinorField,
    parity: Parity,
    dagger: bool,
    coeff: f64,
    xpay: Xpay<'_>,
) -> DiracResult<u64> {
    let geometry = *fat.geometry();
    if let Some(long) = long.filter(|l| *l.geometry() != geometry) {
        return Err(DiracError::unsupported(format!(
            "long links on {} but one-hop links on {geometry}",
            long.geometry()
        )));
    }
    check_operands(&geometry, STAGGERED_NSPIN, out, input, xpay)?;
    let src = input.data()?;
    let xs = xpay.map(|(x, k)| x.data().map(|d| (d, k))).transpose()?;
    let coeff = if dagger { -coeff } else { coeff };

    out.data_mut()?
        .par_chunks_mut(STAGGERED_SITE)
        .enumerate()
        .for_each(|(cb, site)| {
            let x = geometry.cb_coords(parity, cb);
            let mut acc = [C_ZERO; STAGGERED_SITE];
            for mu in 0..N_DIM {
                let eta = staggered_phase(x, mu);
                let naik = long.map(|l| (l, NAIK_HOP));
                for (links, hops) in std::iter::once((fat, 1)).chain(naik) {
                    let (y, wraps) = geometry.shift(x, mu, hops, true);
                    let sign = eta * links.boundary_sign(mu, wraps);
                    let v = links.link(x, mu).mul_vec(&color_site(src, geometry.cb_index(y)));
                    for (a, vc) in acc.iter_mut().zip(v) {
                        *a += vc * sign;
                    }

                    let (y, wraps) = geometry.shift(x, mu, hops, false);
                    let sign = eta * links.boundary_sign(mu, wraps);
                    let v = links
                        .link(y, mu)
                        .adjoint_mul_vec(&color_site(src, geometry.cb_index(y)));
                    for (a, vc) in acc.iter_mut().zip(v) {
                        *a -= vc * sign;
                    }
                }
            }
            let x_site = xs.map(|(d, k)| {
                (&d[cb * STAGGERED_SITE..(cb + 1) * STAGGERED_SITE], k)
            });
            write_site(site, &acc, coeff, x_site);
        });

    let stencil = if long.is_some() {
        STAGGERED_DSLASH_FLOPS
    } else {
        NAIVE_STAGGERED_DSLASH_FLOPS
    };
    Ok(site_flops(stencil, STAGGERED_SITE, xpay.is_some()) * half_volume(out))
}

/// Site-diagonal clover term: `out = A in` on parity `parity`.
///
/// Pass the inverse field to apply `A⁻¹`.
///
/// # Errors
///
/// [`DiracError::FieldMismatch`] if either field is a full field, lives on
/// another lattice than the clover term, or is not a 4-spin field.
pub fn clover_apply(
    out: &mut ColorSpinorField,
    clover: &CloverField,
    input: &ColorSpinorField,
    parity: Parity,
) -> DiracResult<u64> {
    let geometry = *clover.geometry();
    check_operands(&geometry, WILSON_NSPIN, out, input, None)?;
    let src = input.data()?;

    out.data_mut()?
        .par_chunks_mut(WILSON_SITE)
        .enumerate()
        .for_each(|(cb, site)| {
            let blocks = clover.site(geometry.site_index(geometry.cb_coords(parity, cb)));
            let psi = &src[cb * WILSON_SITE..(cb + 1) * WILSON_SITE];
            for (chi, block) in blocks.iter().enumerate() {
                let range = chi * CLOVER_BLOCK..(chi + 1) * CLOVER_BLOCK;
                let v: [Complex64; CLOVER_BLOCK] = std::array::from_fn(|i| psi[range.start + i]);
                site[range].copy_from_slice(&apply_block(block, &v));
            }
        });

    Ok(CLOVER_FLOPS * half_volume(out))
}

/// `η_μ(x) = (−1)^(x_0 + … + x_{μ−1})`
#[inline]
#[must_use]
pub fn staggered_phase(x: [usize; N_DIM], mu: usize) -> f64 {
    if x[..mu].iter().sum::<usize>() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn check_operands(
    geometry: &LatticeGeometry,
    nspin: usize,
    out: &ColorSpinorField,
    input: &ColorSpinorField,
    xpay: Xpay<'_>,
) -> DiracResult<()> {
    let operands = [("out", Some(out)), ("in", Some(input)), ("x", xpay.map(|(x, _)| x))];
    for (role, field) in operands {
        let Some(field) = field else { continue };
        if field.subset() != SiteSubset::Parity {
            return Err(DiracError::mismatch(
                role,
                "site subset",
                format!("{:?}", SiteSubset::Parity),
                format!("{:?}", field.subset()),
            ));
        }
        if field.geometry() != geometry {
            return Err(DiracError::mismatch(role, "extent", geometry, field.geometry()));
        }
        if field.nspin() != nspin {
            return Err(DiracError::mismatch(role, "nspin", nspin, field.nspin()));
        }
        if field.precision() != out.precision() {
            return Err(DiracError::mismatch(
                role,
                "precision",
                format!("{:?}", out.precision()),
                format!("{:?}", field.precision()),
            ));
        }
    }
    Ok(())
}

fn wilson_site(src: &[Complex64], cb: usize) -> &[Complex64] {
    &src[cb * WILSON_SITE..(cb + 1) * WILSON_SITE]
}

fn color_site(src: &[Complex64], cb: usize) -> ColorVector {
    [src[cb * N_COLORS], src[cb * N_COLORS + 1], src[cb * N_COLORS + 2]]
}

/// Colour-transport each of the four spin components of a site.
#[inline]
fn transport(
    psi: &[Complex64],
    link: impl Fn(&ColorVector) -> ColorVector,
) -> [ColorVector; WILSON_NSPIN] {
    std::array::from_fn(|s| {
        link(&[psi[s * N_COLORS], psi[s * N_COLORS + 1], psi[s * N_COLORS + 2]])
    })
}

/// `acc += phase · (1 + proj·γ_μ) t`
#[inline]
fn project_accumulate(
    acc: &mut [Complex64; WILSON_SITE],
    mu: usize,
    proj: f64,
    phase: f64,
    t: &[ColorVector; WILSON_NSPIN],
) {
    for (s, ts) in t.iter().enumerate() {
        let (col, g) = GAMMA[mu][s];
        let g = g * proj;
        for c in 0..N_COLORS {
            acc[s * N_COLORS + c] += (ts[c] + g * t[col][c]) * phase;
        }
    }
}

#[inline]
fn write_site(
    site: &mut [Complex64],
    acc: &[Complex64],
    coeff: f64,
    xpay: Option<(&[Complex64], f64)>,
) {
    match xpay {
        Some((x, k)) => {
            for ((o, a), xi) in site.iter_mut().zip(acc).zip(x) {
                *o = *a * coeff + *xi * k;
            }
        }
        None => {
            for (o, a) in site.iter_mut().zip(acc) {
                *o = *a * coeff;
            }
        }
    }
}

fn site_flops(stencil: u64, site_len: usize, xpay: bool) -> u64 {
    if xpay {
        stencil + XPAY_FLOPS_PER_COMPONENT * site_len as u64
    } else {
        stencil
    }
}

fn half_volume(field: &ColorSpinorField) -> u64 {
    field.sites() as u64
}
