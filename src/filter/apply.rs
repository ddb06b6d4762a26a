//! Overlap-add zero-phase FIR convolution.
//!
//! Matches MNE's `_overlap_add_filter` + `_1d_overlap_filter`.
//!
//! Zero-phase is achieved by shifting the output left by `(N-1)/2` samples,
//! NOT by running filtfilt. The edge transient is suppressed by
//! reflect-limited padding of `N-1` samples on each side.
use anyhow::{ensure, Result};
use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

use super::design::design_filter;
use crate::raw::{ChannelType, Raw};

/// Apply a zero-phase FIR filter to each channel of `data` ([C, T]) in-place.
///
/// `h` must have odd length (guaranteed by the `design_*` functions).
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) -> Result<()> {
    for ch in 0..data.nrows() {
        filter_row(data, ch, h)?;
    }
    Ok(())
}

fn filter_row(data: &mut Array2<f64>, ch: usize, h: &[f64]) -> Result<()> {
    let row: Vec<f64> = data.row(ch).to_vec();
    let filtered = filter_1d(&row, h)?;
    data.row_mut(ch).assign(&ndarray::ArrayView1::from(&filtered));
    Ok(())
}

/// Band-pass (or high/low-pass when an edge is `None`) the rows of `raw`
/// whose type is in `kinds`. Matches `raw.filter(l_freq, h_freq, picks)`.
pub fn filter_raw(
    raw: &mut Raw,
    l_freq: Option<f64>,
    h_freq: Option<f64>,
    kinds: &[ChannelType],
) -> Result<()> {
    let sfreq = raw.sfreq();
    if let Some(h) = h_freq {
        ensure!(h < sfreq / 2.0, "h_freq {h} Hz must be below Nyquist ({} Hz)", sfreq / 2.0);
    }
    let Some(h) = design_filter(l_freq, h_freq, sfreq) else {
        return Ok(());
    };
    let picks: Vec<usize> = raw
        .info
        .channels
        .iter()
        .enumerate()
        .filter(|(_, c)| kinds.contains(&c.kind))
        .map(|(i, _)| i)
        .collect();
    for ch in picks {
        filter_row(&mut raw.data, ch, &h)?;
    }
    Ok(())
}

/// Filter a single 1-D signal with the overlap-add algorithm.
///
/// Returns a vector of the same length as `x`.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    let n_x = x.len();
    let n_h = h.len();

    if n_x == 0 {
        return Ok(vec![]);
    }
    ensure!(n_h % 2 == 1, "zero-phase FIR needs an odd number of taps, got {n_h}");

    // Shift for zero-phase: (N-1)/2  (N must be odd).
    let shift = (n_h - 1) / 2;
    // Edge padding (reflect-limited).
    let n_edge = n_h - 1;

    let x_ext = reflect_limited_pad(x, n_edge, n_edge);
    let n_ext = x_ext.len();

    let n_fft = choose_fft_len(n_h, n_ext);
    let h_fft = fft_of_h(h, n_fft);

    // Overlap-add.
    let n_seg = n_fft - n_h + 1;
    let n_segments = n_ext.div_ceil(n_seg);
    let mut x_filtered = vec![0.0_f64; n_ext];

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft_fwd = planner.plan_fft_forward(n_fft);
    let fft_inv = planner.plan_fft_inverse(n_fft);
    let inv_scale = 1.0 / n_fft as f64;

    for seg_idx in 0..n_segments {
        let start = seg_idx * n_seg;
        let stop = (start + n_seg).min(n_ext);

        let mut buf: Vec<Complex<f64>> = x_ext[start..stop]
            .iter()
            .map(|&v| Complex { re: v, im: 0.0 })
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();

        fft_fwd.process(&mut buf);
        for (b, &hf) in buf.iter_mut().zip(h_fft.iter()) {
            *b *= hf;
        }
        fft_inv.process(&mut buf);

        // Accumulate with overlap-add (accounting for zero-phase shift).
        let out_start = start.saturating_sub(shift);
        let out_end = (out_start + n_fft).min(n_ext);
        let prod_start = shift.saturating_sub(start);

        for (o, p) in (out_start..out_end).zip(prod_start..) {
            if p < buf.len() {
                x_filtered[o] += buf[p].re * inv_scale;
            }
        }
    }

    Ok(x_filtered[n_edge..n_edge + n_x].to_vec())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Reflect-limited padding (matches MNE's `_smart_pad`).
///
/// Left:  `pad[i] = 2*x[0] - x[n_l-i]`  for i in 1..=n_l
/// Right: `pad[i] = 2*x[-1] - x[-(i+1)]` for i in 1..=n_r
///
/// Padding beyond `len(x) - 1` samples is filled with zeros.
pub(crate) fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let actual_l = n_l.min(n - 1);
    let actual_r = n_r.min(n - 1);

    let mut out = Vec::with_capacity(n_l + n + n_r);
    out.extend(std::iter::repeat(0.0).take(n_l - actual_l));
    out.extend((1..=actual_l).rev().map(|i| 2.0 * x[0] - x[i]));
    out.extend_from_slice(x);
    let last = x[n - 1];
    out.extend((1..=actual_r).map(|i| 2.0 * last - x[n - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(n_r - actual_r));
    out
}

/// Choose the optimal FFT block size (power of 2 minimising operation count).
///
/// Matches MNE's cost function:
///   `cost = ceil(n_x / (N - n_h + 1)) * N * (log2(N) + 1) + 4e-5 * N * n_x`
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;

    let max_pow = (n_x as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow.max(min_pow);
    let mut best_cost = f64::INFINITY;

    for pow in min_pow..=max_pow {
        let n = 1_usize << pow;
        if n < min_fft {
            continue;
        }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
            + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}

/// Compute the FFT of `h` zero-padded to `n_fft`.
fn fft_of_h(h: &[f64], n_fft: usize) -> Vec<Complex<f64>> {
    let mut buf: Vec<Complex<f64>> = h
        .iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    planner.plan_fft_forward(n_fft).process(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::design::{design_bandpass, design_highpass};
    use crate::raw::{Channel, Info};
    use std::f64::consts::PI;

    #[test]
    fn filter_preserves_length() {
        let x: Vec<f64> = (0..1024).map(|i| (i as f64 / 1024.0).sin()).collect();
        let h = design_highpass(0.5, 256.0);
        let y = filter_1d(&x, &h).unwrap();
        assert_eq!(y.len(), x.len());
    }

    #[test]
    fn filter_removes_dc() {
        let x = vec![1.0_f64; 4096];
        let h = design_highpass(0.5, 256.0);
        let y = filter_1d(&x, &h).unwrap();
        let n_h = h.len();
        let interior = &y[n_h..y.len() - n_h];
        let max_val = interior.iter().map(|v| v.abs()).fold(0.0_f64, f64::max);
        assert!(max_val < 1e-3, "DC not removed: max={max_val}");
    }

    #[test]
    fn even_taps_rejected() {
        assert!(filter_1d(&[1.0, 2.0, 3.0], &[0.5, 0.5]).is_err());
    }

    #[test]
    fn reflect_limited_left_pad() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let padded = reflect_limited_pad(&x, 3, 0);
        // left pad: 2*1 - x[3]=4 → -2, 2*1 - x[2]=3 → -1, 2*1 - x[1]=2 → 0
        assert_eq!(&padded[..3], &[-2.0, -1.0, 0.0]);
        assert_eq!(&padded[3..], &x[..]);
    }

    #[test]
    fn reflect_pad_longer_than_signal_zero_fills() {
        let x = [1.0, 2.0];
        let padded = reflect_limited_pad(&x, 3, 2);
        assert_eq!(padded, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn filter_raw_only_touches_requested_types() {
        let sfreq = 250.0;
        let n = 5000;
        let sig: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / sfreq;
                (2.0 * PI * 10.0 * t).sin() + 3.0
            })
            .collect();
        let data = Array2::from_shape_fn((2, n), |(_, t)| sig[t]);
        let info = Info::new(
            sfreq,
            vec![Channel::new("Cz", ChannelType::Eeg), Channel::new("EOG", ChannelType::Eog)],
        );
        let mut raw = Raw::new(data, info).unwrap();
        filter_raw(&mut raw, Some(7.0), Some(14.0), &[ChannelType::Eeg]).unwrap();

        // EOG row unchanged.
        assert_eq!(raw.data[[1, 100]], sig[100]);
        // EEG row: offset removed, 10 Hz kept.
        let h = design_bandpass(7.0, 14.0, sfreq);
        let interior: Vec<f64> = raw.data.row(0).iter().skip(h.len()).take(n - 2 * h.len()).copied().collect();
        let mean = interior.iter().sum::<f64>() / interior.len() as f64;
        let rms = (interior.iter().map(|v| v * v).sum::<f64>() / interior.len() as f64).sqrt();
        assert!(mean.abs() < 1e-2, "mean {mean}");
        approx::assert_abs_diff_eq!(rms, 1.0 / 2.0_f64.sqrt(), epsilon = 2e-2);
    }

    #[test]
    fn filter_raw_rejects_edge_above_nyquist() {
        let info = Info::new(100.0, vec![Channel::new("Cz", ChannelType::Eeg)]);
        let mut raw = Raw::new(Array2::zeros((1, 500)), info).unwrap();
        assert!(filter_raw(&mut raw, None, Some(60.0), &[ChannelType::Eeg]).is_err());
    }
}
