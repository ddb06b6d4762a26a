//! Spherical spline interpolation of bad EEG channels (Perrin et al., 1989).
//!
//! Matches `raw.interpolate_bads(reset_bads=True)` for EEG:
//!
//! ```text
//! g(x) = 1/(4π) Σ_{n=1..7} (2n+1) / (n⁴ (n+1)⁴) · Pₙ(x)
//!
//! C  = [[G_from + αI, 1], [1ᵀ, 0]]          (α = 1e-5)
//! W  = [G_to_from, 1] · pinv(C)[:, :-1]
//! x_bad = W · x_good
//! ```
//!
//! Positions are projected onto the unit sphere around the head origin.
use anyhow::{anyhow, bail, Result};
use log::debug;
use nalgebra::DMatrix;
use ndarray::Array2;
use std::f64::consts::PI;

use crate::raw::{ChannelType, Raw};

const N_LEGENDRE_TERMS: usize = 7;
const STIFFNESS: i32 = 4;
const ALPHA: f64 = 1e-5;

/// Legendre series `Σ cₙ Pₙ(x)` with `c₀ = 0`.
fn calc_g(cosang: f64) -> f64 {
    let x = cosang.clamp(-1.0, 1.0);
    let (mut p_prev, mut p) = (1.0, x);
    let mut g = 0.0;
    for n in 1..=N_LEGENDRE_TERMS {
        let nf = n as f64;
        g += (2.0 * nf + 1.0) / (nf.powi(STIFFNESS) * (nf + 1.0).powi(STIFFNESS) * 4.0 * PI) * p;
        let next = ((2.0 * nf + 1.0) * x * p - nf * p_prev) / (nf + 1.0);
        p_prev = p;
        p = next;
    }
    g
}

fn unit(p: [f64; 3]) -> [f64; 3] {
    let n = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    if n > 0.0 { [p[0] / n, p[1] / n, p[2] / n] } else { p }
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// `[n_to, n_from]` matrix mapping good-channel values to the bad positions.
pub fn make_interpolation_matrix(pos_from: &[[f64; 3]], pos_to: &[[f64; 3]]) -> Result<Array2<f64>> {
    let from: Vec<[f64; 3]> = pos_from.iter().map(|&p| unit(p)).collect();
    let to: Vec<[f64; 3]> = pos_to.iter().map(|&p| unit(p)).collect();
    let n = from.len();

    let c = DMatrix::from_fn(n + 1, n + 1, |i, j| match (i < n, j < n) {
        (true, true) => calc_g(dot(&from[i], &from[j])) + if i == j { ALPHA } else { 0.0 },
        (false, false) => 0.0,
        _ => 1.0,
    });
    let c_inv = c
        .pseudo_inverse(1e-12)
        .map_err(|e| anyhow!("interpolation matrix pseudo-inverse failed: {e}"))?;

    Ok(Array2::from_shape_fn((to.len(), n), |(r, k)| {
        let mut acc = c_inv[(n, k)];
        for (j, f) in from.iter().enumerate() {
            acc += calc_g(dot(&to[r], f)) * c_inv[(j, k)];
        }
        acc
    }))
}

/// Replace bad EEG channels with spherical-spline estimates from the good
/// ones and clear `bads`. Returns the names of the interpolated channels.
pub fn interpolate_bads(raw: &mut Raw) -> Result<Vec<String>> {
    let eeg = raw.info.picks(ChannelType::Eeg, false);
    let (bad, good): (Vec<usize>, Vec<usize>) =
        eeg.into_iter().partition(|&i| raw.info.is_bad(&raw.info.channels[i].name));
    if bad.is_empty() {
        raw.info.bads.clear();
        return Ok(Vec::new());
    }
    if good.len() < 3 {
        bail!("only {} good EEG channels left, cannot interpolate", good.len());
    }

    let position = |i: usize| {
        let ch = &raw.info.channels[i];
        ch.pos.ok_or_else(|| anyhow!("channel {} has no position, cannot interpolate", ch.name))
    };
    let pos_from = good.iter().map(|&i| position(i)).collect::<Result<Vec<_>>>()?;
    let pos_to = bad.iter().map(|&i| position(i)).collect::<Result<Vec<_>>>()?;

    let w = make_interpolation_matrix(&pos_from, &pos_to)?;
    let good_data = raw.get_data(&good);
    let estimate = w.dot(&good_data);
    for (row, &ch) in bad.iter().enumerate() {
        raw.data.row_mut(ch).assign(&estimate.row(row));
    }

    let names: Vec<String> = bad.iter().map(|&i| raw.info.channels[i].name.clone()).collect();
    debug!("interpolated {} channel(s) from {} good: {:?}", bad.len(), good.len(), names);
    raw.info.bads.clear();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::montage;
    use crate::raw::{Channel, Info};

    fn montage_raw(names: &[&str], value: impl Fn([f64; 3]) -> f64) -> Raw {
        let channels: Vec<Channel> = names
            .iter()
            .map(|n| {
                let mut c = Channel::new(*n, ChannelType::Eeg);
                c.pos = montage::position(n);
                c
            })
            .collect();
        let data = Array2::from_shape_fn((names.len(), 4), |(c, t)| {
            value(channels[c].pos.unwrap()) * (t + 1) as f64
        });
        Raw::new(data, Info::new(100.0, channels)).unwrap()
    }

    const NAMES: [&str; 19] = [
        "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T3", "C3", "Cz", "C4", "T4", "T5", "P3",
        "Pz", "P4", "T6", "O1", "O2",
    ];

    #[test]
    fn legendre_series_at_pole() {
        // Pₙ(1) = 1 for every n.
        let expected: f64 = (1..=7)
            .map(|n| {
                let n = n as f64;
                (2.0 * n + 1.0) / (n.powi(4) * (n + 1.0).powi(4) * 4.0 * PI)
            })
            .sum();
        approx::assert_abs_diff_eq!(calc_g(1.0), expected, epsilon = 1e-15);
    }

    #[test]
    fn interpolation_weights_sum_to_one() {
        let pos: Vec<[f64; 3]> = NAMES.iter().filter(|n| **n != "Cz").map(|n| montage::position(n).unwrap()).collect();
        let w = make_interpolation_matrix(&pos, &[montage::position("Cz").unwrap()]).unwrap();
        approx::assert_abs_diff_eq!(w.row(0).sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn constant_field_is_reproduced() {
        let mut raw = montage_raw(&NAMES, |_| 2.0);
        raw.data.row_mut(9).fill(0.0);
        raw.info.bads = vec!["Cz".into()];
        let done = interpolate_bads(&mut raw).unwrap();
        assert_eq!(done, vec!["Cz".to_string()]);
        assert!(raw.info.bads.is_empty());
        for t in 0..4 {
            approx::assert_abs_diff_eq!(raw.data[[9, t]], 2.0 * (t + 1) as f64, epsilon = 1e-4);
        }
    }

    #[test]
    fn smooth_field_is_approximated() {
        // Linear gradient front-to-back; C3 sits near its centre line.
        let mut raw = montage_raw(&NAMES, |p| p[1] / montage::HEAD_RADIUS);
        let truth = raw.data[[8, 0]];
        raw.data.row_mut(8).fill(5.0);
        raw.info.bads = vec!["C3".into()];
        interpolate_bads(&mut raw).unwrap();
        approx::assert_abs_diff_eq!(raw.data[[8, 0]], truth, epsilon = 0.15);
    }

    #[test]
    fn missing_position_is_an_error() {
        let mut raw = montage_raw(&NAMES, |_| 1.0);
        raw.info.channels[9].pos = None;
        raw.info.bads = vec!["Cz".into()];
        assert!(interpolate_bads(&mut raw).is_err());
    }
}
