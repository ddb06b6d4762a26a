mod common;
use common::{rms, sine, synthetic_raw};
use pedconn::filter::{apply_fir_zero_phase, design_bandpass, design_highpass, filter_raw};
use pedconn::{Channel, ChannelType, Info, Raw};
use ndarray::Array2;

fn two_tone(f_keep: f64, f_reject: f64, sfreq: f64, seconds: f64) -> Vec<f64> {
    let n = (sfreq * seconds) as usize;
    let a = sine(f_keep, sfreq, n, 0.0);
    let b = sine(f_reject, sfreq, n, 0.3);
    a.iter().zip(&b).map(|(x, y)| x + y).collect()
}

#[test]
fn highpass_removes_sub_hz_content() {
    // After a 1 Hz highpass, 0.1 Hz is gone and 5 Hz survives.
    let sfreq = 250.0;
    let row = two_tone(5.0, 0.1, sfreq, 60.0);
    let n = row.len();
    let mut data = Array2::from_shape_vec((1, n), row).unwrap();
    let h = design_highpass(1.0, sfreq);
    apply_fir_zero_phase(&mut data, &h).unwrap();

    let filtered = data.row(0).to_vec();
    let guard = h.len();
    let r = rms(&filtered[guard..n - guard]);
    // Pure 5 Hz sine has RMS 1/√2.
    assert!((r - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02, "RMS {r:.3}");
}

#[test]
fn bandpass_keeps_alpha_and_rejects_line_noise() {
    let sfreq = 250.0;
    let row = two_tone(10.0, 50.0, sfreq, 30.0);
    let n = row.len();
    let mut data = Array2::from_shape_vec((1, n), row).unwrap();
    let h = design_bandpass(7.0, 14.0, sfreq);
    apply_fir_zero_phase(&mut data, &h).unwrap();

    let filtered = data.row(0).to_vec();
    let guard = h.len();
    let r = rms(&filtered[guard..n - guard]);
    assert!((r - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02, "RMS {r:.3}");
}

#[test]
fn zero_phase_filter_does_not_shift_peaks() {
    let sfreq = 250.0;
    let n = 5000;
    let x = sine(10.0, sfreq, n, 0.0);
    let mut data = Array2::from_shape_vec((1, n), x.clone()).unwrap();
    apply_fir_zero_phase(&mut data, &design_bandpass(7.0, 14.0, sfreq)).unwrap();
    // Correlation at zero lag stays at the maximum.
    let mid = n / 2;
    let corr = |lag: usize| -> f64 { (0..500).map(|i| x[mid + i] * data[[0, mid + i + lag]]).sum() };
    assert!(corr(0) > corr(1));
    assert!(corr(0) > corr(24));
}

#[test]
fn filter_raw_only_touches_requested_types() {
    let before = synthetic_raw(250.0, 20.0, 7);
    let mut raw = before.clone();
    filter_raw(&mut raw, Some(1.0), Some(40.0), &[ChannelType::Eeg]).unwrap();
    let eog = raw.info.picks(ChannelType::Eog, false);
    assert_eq!(raw.get_data(&eog), before.get_data(&eog));
    let eeg = raw.info.picks(ChannelType::Eeg, false);
    assert_ne!(raw.get_data(&eeg), before.get_data(&eeg));
}

#[test]
fn cutoff_above_nyquist_is_an_error() {
    let info = Info::new(100.0, vec![Channel::new("Cz", ChannelType::Eeg)]);
    let mut raw = Raw::new(Array2::zeros((1, 1000)), info).unwrap();
    assert!(filter_raw(&mut raw, Some(1.0), Some(60.0), &[ChannelType::Eeg]).is_err());
}
