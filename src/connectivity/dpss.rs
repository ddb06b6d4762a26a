//! Discrete prolate spheroidal (Slepian) sequences.
//!
//! Matches `mne.time_frequency.dpss_windows` (SciPy's `windows.dpss` with
//! unit-energy normalisation). The tapers are the eigenvectors of the
//! symmetric tridiagonal matrix
//!
//! ```text
//! d[i] = ((M − 1 − 2i) / 2)² · cos(2πW)       W = NW / M
//! e[i] = i (M − i) / 2
//! ```
//!
//! for its `K` largest eigenvalues, found with Sturm-sequence bisection
//! followed by inverse iteration.
use anyhow::{ensure, Result};
use ndarray::Array2;
use std::f64::consts::PI;

/// Number of eigenvalues of the tridiagonal `(d, e)` strictly below `x`.
/// `e[0]` is unused.
fn sturm_count(d: &[f64], e: &[f64], x: f64) -> usize {
    let mut count = 0;
    let mut q = d[0] - x;
    if q < 0.0 {
        count += 1;
    }
    for i in 1..d.len() {
        if q == 0.0 {
            q = f64::EPSILON * (e[i].abs() + 1.0);
        }
        q = d[i] - x - e[i] * e[i] / q;
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// Eigenvalue with ascending index `m`.
fn bisect_eigenvalue(d: &[f64], e: &[f64], m: usize) -> f64 {
    let n = d.len();
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for i in 0..n {
        let r = if i > 0 { e[i].abs() } else { 0.0 } + if i + 1 < n { e[i + 1].abs() } else { 0.0 };
        lo = lo.min(d[i] - r);
        hi = hi.max(d[i] + r);
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if sturm_count(d, e, mid) > m {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Solve `(T − λI) x = b` in place with partially pivoted tridiagonal LU
/// (LAPACK `gttrf` + `gtts2`).
fn shifted_solve(d: &[f64], e: &[f64], lambda: f64, b: &mut [f64]) {
    let n = d.len();
    let tiny = f64::EPSILON * d.iter().chain(e.iter()).fold(1.0_f64, |m, v| m.max(v.abs()));
    let mut dl: Vec<f64> = e[1..].to_vec();
    let mut du: Vec<f64> = e[1..].to_vec();
    let mut dd: Vec<f64> = d.iter().map(|v| v - lambda).collect();
    let mut du2 = vec![0.0; n.saturating_sub(2)];
    let mut swapped = vec![false; n.saturating_sub(1)];

    for i in 0..n - 1 {
        if dd[i].abs() >= dl[i].abs() {
            if dd[i] == 0.0 {
                dd[i] = tiny;
            }
            let fact = dl[i] / dd[i];
            dl[i] = fact;
            dd[i + 1] -= fact * du[i];
        } else {
            let fact = dd[i] / dl[i];
            dd[i] = dl[i];
            dl[i] = fact;
            let temp = du[i];
            du[i] = dd[i + 1];
            dd[i + 1] = temp - fact * dd[i + 1];
            if i + 2 < n {
                du2[i] = du[i + 1];
                du[i + 1] = -fact * du[i + 1];
            }
            swapped[i] = true;
        }
    }
    if dd[n - 1] == 0.0 {
        dd[n - 1] = tiny;
    }

    for i in 0..n - 1 {
        if swapped[i] {
            let temp = b[i];
            b[i] = b[i + 1];
            b[i + 1] = temp - dl[i] * b[i];
        } else {
            b[i + 1] -= dl[i] * b[i];
        }
    }
    b[n - 1] /= dd[n - 1];
    if n > 1 {
        b[n - 2] = (b[n - 2] - du[n - 2] * b[n - 1]) / dd[n - 2];
    }
    for i in (0..n.saturating_sub(2)).rev() {
        b[i] = (b[i] - du[i] * b[i + 1] - du2[i] * b[i + 2]) / dd[i];
    }
}

fn normalise(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Fraction of each unit-energy window's energy inside `[−W, W]`.
fn concentration(window: &[f64], w: f64) -> f64 {
    let m = window.len();
    let mut ratio = 2.0 * w * window.iter().map(|x| x * x).sum::<f64>();
    for lag in 1..m {
        let r: f64 = window[..m - lag].iter().zip(&window[lag..]).map(|(a, b)| a * b).sum();
        ratio += r * 2.0 * (2.0 * PI * w * lag as f64).sin() / (PI * lag as f64);
    }
    ratio
}

/// `k_max` DPSS tapers of length `n` with time-half-bandwidth `half_nbw`.
///
/// Returns `([K, n] tapers, concentrations)`, most concentrated first.
/// `sym = false` gives periodic tapers (computed at `n + 1` and truncated).
/// With `low_bias`, only tapers with concentration above 0.9 are kept (at
/// least one).
pub fn dpss_windows(
    n: usize,
    half_nbw: f64,
    k_max: usize,
    sym: bool,
    low_bias: bool,
) -> Result<(Array2<f64>, Vec<f64>)> {
    ensure!(n >= 2, "DPSS length must be at least 2, got {n}");
    ensure!(half_nbw > 0.0, "time-half-bandwidth must be positive, got {half_nbw}");
    let m = if sym { n } else { n + 1 };
    let k_max = k_max.clamp(1, m);
    let w = half_nbw / m as f64;

    let cos_w = (2.0 * PI * w).cos();
    let d: Vec<f64> = (0..m)
        .map(|i| ((m as f64 - 1.0 - 2.0 * i as f64) / 2.0).powi(2) * cos_w)
        .collect();
    let e: Vec<f64> = (0..m).map(|i| i as f64 * (m - i) as f64 / 2.0).collect();

    let thresh = (1.0 / m as f64).max(1e-7);
    let mut windows = Vec::with_capacity(k_max);
    let mut ratios = Vec::with_capacity(k_max);
    for k in 0..k_max {
        let lambda = bisect_eigenvalue(&d, &e, m - 1 - k);
        let mut v: Vec<f64> = (0..m).map(|i| 1.0 + i as f64 / m as f64).collect();
        for _ in 0..4 {
            shifted_solve(&d, &e, lambda, &mut v);
            normalise(&mut v);
        }
        // Sign convention: even tapers sum positive, odd tapers start positive.
        let flip = if k % 2 == 0 {
            v.iter().sum::<f64>() < 0.0
        } else {
            v.iter().find(|x| **x * **x > thresh).is_some_and(|x| *x < 0.0)
        };
        if flip {
            v.iter_mut().for_each(|x| *x = -*x);
        }
        ratios.push(concentration(&v, w));
        windows.push(v);
    }

    let keep: Vec<usize> = if low_bias {
        let good: Vec<usize> = (0..k_max).filter(|&k| ratios[k] > 0.9).collect();
        if good.is_empty() {
            let best = (0..k_max).max_by(|&a, &b| ratios[a].total_cmp(&ratios[b])).unwrap_or(0);
            vec![best]
        } else {
            good
        }
    } else {
        (0..k_max).collect()
    };

    let tapers = Array2::from_shape_fn((keep.len(), n), |(r, i)| windows[keep[r]][i]);
    Ok((tapers, keep.iter().map(|&k| ratios[k]).collect()))
}
