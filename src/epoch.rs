//! Fixed-length epoching.
//!
//! Matches `mne.make_fixed_length_epochs(raw, duration, overlap)` with
//! `baseline=None`: windows of `round(duration · sfreq)` samples every
//! `round((duration − overlap) · sfreq)` samples, trailing incomplete
//! windows dropped.
use anyhow::{ensure, Result};
use ndarray::{s, Array2, Array3};

/// Window length and step in samples.
pub fn epoch_geometry(sfreq: f64, duration: f64, overlap: f64) -> Result<(usize, usize)> {
    ensure!(duration > 0.0, "epoch duration must be positive, got {duration}");
    ensure!(
        (0.0..duration).contains(&overlap),
        "overlap must be in [0, duration), got {overlap}"
    );
    let n = (duration * sfreq).round() as usize;
    let step = ((duration - overlap) * sfreq).round() as usize;
    ensure!(n > 0 && step > 0, "epoch of {duration} s at {sfreq} Hz is empty");
    Ok((n, step))
}

/// Cut `data` ([C, T]) into `[E, C, n]` windows of `n` samples, one every
/// `step` samples.
pub fn epoch_windows(data: &Array2<f64>, n: usize, step: usize) -> Array3<f64> {
    let (n_ch, n_t) = data.dim();
    let n_epochs = if n_t < n || step == 0 { 0 } else { (n_t - n) / step + 1 };

    let mut out = Array3::<f64>::zeros((n_epochs, n_ch, n));
    for e in 0..n_epochs {
        let start = e * step;
        out.slice_mut(s![e, .., ..])
            .assign(&data.slice(s![.., start..start + n]));
    }
    out
}

/// Fixed-length epochs of `duration` seconds with `overlap` seconds overlap.
pub fn make_fixed_length_epochs(
    data: &Array2<f64>,
    sfreq: f64,
    duration: f64,
    overlap: f64,
) -> Result<Array3<f64>> {
    let (n, step) = epoch_geometry(sfreq, duration, overlap)?;
    Ok(epoch_windows(data, n, step))
}
