//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! MNE's `fir_design='firwin'` builds a filter from one windowed-sinc lowpass
//! per transition band, each with its own length, summed around a common
//! centre:
//!   • transition bandwidths
//!       l_trans = min(max(0.25 · l_freq, 2.0), l_freq)
//!       h_trans = min(max(0.25 · h_freq, 2.0), sfreq/2 − h_freq)
//!   • total length N = ceil(3.3 / min(trans) · sfreq), rounded to odd
//!   • per-transition length round(3.3 · sfreq / trans), rounded to odd
//!   • lowpass cutoff at the middle of each transition band
use std::f64::consts::PI;

/// Hamming main-lobe length factor used by MNE.
const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// Compute MNE-compatible transition bandwidth for a highpass edge.
///
/// Rule: `min(max(0.25 * l_freq, 2.0), l_freq)`
pub fn auto_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// Transition bandwidth for a lowpass edge.
///
/// Rule: `min(max(0.25 * h_freq, 2.0), sfreq / 2 - h_freq)`
pub fn auto_h_trans_bandwidth(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Compute the number of FIR taps for a given transition bandwidth.
/// Returns an odd integer (required for zero-phase linear-phase FIR).
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (HAMMING_LENGTH_FACTOR / trans_bw * sfreq).ceil() as usize;
    make_odd(n_raw.max(1))
}

fn make_odd(n: usize) -> usize {
    if n % 2 == 0 { n + 1 } else { n }
}

/// Length of the lowpass built for one transition of width `trans_bw` Hz.
fn transition_length(trans_bw: f64, sfreq: f64) -> usize {
    make_odd((HAMMING_LENGTH_FACTOR * sfreq / trans_bw).round() as usize)
}

/// Add `sign · h_part` centred into `h`.
fn add_centred(h: &mut [f64], h_part: &[f64], sign: f64) {
    let offset = (h.len() - h_part.len()) / 2;
    for (dst, &v) in h[offset..offset + h_part.len()].iter_mut().zip(h_part) {
        *dst += sign * v;
    }
}

/// Design a zero-phase highpass FIR filter using a Hamming-windowed sinc.
///
/// Matches `mne.filter.create_filter(None, sfreq, l_freq=l_freq, h_freq=None,
///   filter_length='auto', fir_window='hamming', fir_design='firwin', phase='zero')`.
pub fn design_highpass(l_freq: f64, sfreq: f64) -> Vec<f64> {
    let trans_bw = auto_trans_bandwidth(l_freq);
    let n = auto_filter_length(trans_bw, sfreq);
    let cutoff_hz = l_freq - trans_bw / 2.0;

    // Spectral inversion: highpass = delta[n=N/2] - lowpass
    let h_lp = firwin(transition_length(trans_bw, sfreq).min(n), cutoff_hz, sfreq, true);
    let mut h = vec![0.0; n];
    h[n / 2] = 1.0;
    add_centred(&mut h, &h_lp, -1.0);
    h
}

/// Design a zero-phase lowpass FIR filter at `h_freq`.
pub fn design_lowpass(h_freq: f64, sfreq: f64) -> Vec<f64> {
    let trans_bw = auto_h_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(trans_bw, sfreq);
    firwin(n, h_freq + trans_bw / 2.0, sfreq, true)
}

/// Design a zero-phase band-pass FIR filter passing `l_freq..h_freq`.
///
/// Built as `lowpass(h_freq + h_trans/2) − lowpass(l_freq − l_trans/2)`,
/// each lowpass sized for its own transition, as MNE's `_firwin_design` does.
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Vec<f64> {
    let l_trans = auto_trans_bandwidth(l_freq);
    let h_trans = auto_h_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(l_trans.min(h_trans), sfreq);

    let mut h = vec![0.0; n];
    let h_hi = firwin(transition_length(h_trans, sfreq).min(n), h_freq + h_trans / 2.0, sfreq, true);
    add_centred(&mut h, &h_hi, 1.0);
    let h_lo = firwin(transition_length(l_trans, sfreq).min(n), l_freq - l_trans / 2.0, sfreq, true);
    add_centred(&mut h, &h_lo, -1.0);
    h
}

/// Pick the design for optional edges (MNE's `raw.filter(l_freq, h_freq)`).
///
/// Returns `None` when both edges are `None`.
pub fn design_filter(l_freq: Option<f64>, h_freq: Option<f64>, sfreq: f64) -> Option<Vec<f64>> {
    match (l_freq, h_freq) {
        (Some(l), Some(h)) => Some(design_bandpass(l, h, sfreq)),
        (Some(l), None) => Some(design_highpass(l, sfreq)),
        (None, Some(h)) => Some(design_lowpass(h, sfreq)),
        (None, None) => None,
    }
}

/// Design a lowpass FIR filter using a Hamming-windowed sinc.
///
/// `pass_zero=true` means the DC component passes (lowpass).
/// `cutoff_hz` is the -6 dB point.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let nyq = sfreq / 2.0;
    let fc = cutoff_hz / nyq; // normalised [0, 1]

    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc  (L'Hôpital)
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    // Normalise so sum = 1 (unit DC gain for lowpass).
    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }

    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Magnitude of the frequency response of `h` at `freq` Hz.
pub fn gain_at(h: &[f64], freq: f64, sfreq: f64) -> f64 {
    let w = 2.0 * PI * freq / sfreq;
    let (re, im) = h.iter().enumerate().fold((0.0, 0.0), |(re, im), (k, &v)| {
        (re + v * (w * k as f64).cos(), im - v * (w * k as f64).sin())
    });
    (re * re + im * im).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_length_is_odd() {
        for l_freq in [0.5, 1.0, 2.0, 5.0] {
            let tb = auto_trans_bandwidth(l_freq);
            let n = auto_filter_length(tb, 256.0);
            assert!(n % 2 == 1, "N={n} is even for l_freq={l_freq}");
        }
    }

    #[test]
    fn highpass_known_length_256hz() {
        // At 256 Hz / 0.5 Hz: MNE produces 1691 taps.
        let h = design_highpass(0.5, 256.0);
        assert_eq!(h.len(), 1691, "expected 1691 taps, got {}", h.len());
    }

    #[test]
    fn bandpass_lengths_match_mne() {
        // 1–40 Hz at 250 Hz: l_trans = 1 Hz → 825 taps.
        assert_eq!(design_bandpass(1.0, 40.0, 250.0).len(), 825);
        // 7–14 Hz at 250 Hz: l_trans = 2 Hz → 413 taps.
        assert_eq!(design_bandpass(7.0, 14.0, 250.0).len(), 413);
    }

    #[test]
    fn highpass_sum_near_zero() {
        let h = design_highpass(0.5, 256.0);
        let s: f64 = h.iter().sum();
        assert!(s.abs() < 1e-9, "highpass sum = {s}");
    }

    #[test]
    fn bandpass_is_symmetric() {
        let h = design_bandpass(7.0, 14.0, 250.0);
        let n = h.len();
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn bandpass_response() {
        let sfreq = 250.0;
        let h = design_bandpass(7.0, 14.0, sfreq);
        approx::assert_abs_diff_eq!(gain_at(&h, 10.0, sfreq), 1.0, epsilon = 1e-2);
        assert!(gain_at(&h, 0.0, sfreq) < 1e-6);
        assert!(gain_at(&h, 2.0, sfreq) < 1e-2);
        assert!(gain_at(&h, 25.0, sfreq) < 1e-2);
    }

    #[test]
    fn lowpass_dc_gain_unity() {
        let h = firwin(101, 10.0, 256.0, true);
        let dc: f64 = h.iter().sum();
        approx::assert_abs_diff_eq!(dc, 1.0, epsilon = 1e-9);
        let lp = design_lowpass(40.0, 250.0);
        approx::assert_abs_diff_eq!(gain_at(&lp, 5.0, 250.0), 1.0, epsilon = 1e-2);
        assert!(gain_at(&lp, 60.0, 250.0) < 1e-2);
    }

    #[test]
    fn design_filter_dispatch() {
        assert!(design_filter(None, None, 250.0).is_none());
        assert_eq!(design_filter(Some(1.0), None, 250.0).unwrap().len(), 825);
    }
}
