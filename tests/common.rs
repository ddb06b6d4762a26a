/// Shared helpers: synthetic recordings and on-disk fixtures.
use ndarray::Array2;
use pedconn::{montage, Channel, ChannelType, Info, Raw};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::Path;

#[allow(unused)]
pub const EEG_NAMES: [&str; 8] = ["Fp1", "Fp2", "F3", "F4", "C3", "C4", "O1", "O2"];

/// Standard normal sample (Box–Muller).
pub fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[allow(unused)]
pub fn sine(freq: f64, sfreq: f64, n: usize, phase: f64) -> Vec<f64> {
    (0..n).map(|i| (2.0 * PI * freq * i as f64 / sfreq + phase).sin()).collect()
}

/// Channel layout of [`synthetic_uv`]: the EEG names, then EOG and ECG.
#[allow(unused)]
pub fn channel_layout() -> Vec<(String, ChannelType)> {
    let mut out: Vec<(String, ChannelType)> =
        EEG_NAMES.iter().map(|n| (n.to_string(), ChannelType::Eeg)).collect();
    out.push(("EOG".into(), ChannelType::Eog));
    out.push(("ECG".into(), ChannelType::Ecg));
    out
}

/// `[10, T]` resting-state-like signal in microvolts.
///
/// EEG rows: shared 10 Hz rhythm with a channel-dependent lag, white noise
/// and blinks that fade from frontal to occipital. Row 8 carries the blinks
/// (EOG), row 9 a 75 bpm spike train (ECG).
#[allow(unused)]
pub fn synthetic_uv(sfreq: f64, seconds: f64, seed: u64) -> Array2<f64> {
    let n = (sfreq * seconds) as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    let blink: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 / sfreq;
            let dt = (t % 4.0) - 2.0;
            150.0 * (-dt * dt / (2.0 * 0.08 * 0.08)).exp()
        })
        .collect();
    let heart: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 / sfreq;
            let dt = (t % 0.8) - 0.4;
            400.0 * (-dt * dt / (2.0 * 0.01 * 0.01)).exp()
        })
        .collect();
    let frontal = [1.0, 1.0, 0.6, 0.6, 0.3, 0.3, 0.1, 0.1];

    let mut data = Array2::zeros((10, n));
    for c in 0..8 {
        let lag = 0.3 * c as f64;
        let alpha = sine(10.0, sfreq, n, lag);
        for t in 0..n {
            data[[c, t]] = 20.0 * alpha[t] + 5.0 * gaussian(&mut rng) + frontal[c] * blink[t];
        }
    }
    for t in 0..n {
        data[[8, t]] = blink[t] + 5.0 * gaussian(&mut rng);
        data[[9, t]] = heart[t] + 5.0 * gaussian(&mut rng);
    }
    data
}

/// [`synthetic_uv`] as a [`Raw`] in volts with 10-20 positions.
#[allow(unused)]
pub fn synthetic_raw(sfreq: f64, seconds: f64, seed: u64) -> Raw {
    let channels = channel_layout()
        .into_iter()
        .map(|(name, kind)| Channel::new(name, kind))
        .collect();
    let mut info = Info::new(sfreq, channels);
    montage::set_montage(&mut info);
    Raw::new(synthetic_uv(sfreq, seconds, seed).mapv(|v| v * 1e-6), info).unwrap()
}

/// `label,channel,description` rows mapping [`channel_layout`] onto
/// `C001…C010`, plus an unused photic row.
#[allow(unused)]
pub fn write_labels_csv(path: &Path) {
    let mut text = String::from("label,channel,description\n");
    for (i, (name, kind)) in channel_layout().iter().enumerate() {
        text.push_str(&format!("{name},C{:03},{kind}\n", i + 1));
    }
    text.push_str("Photic,PHOTIC,photic\n");
    std::fs::write(path, text).unwrap();
}

/// Vendor export: UTF-16LE with BOM, `%` header, 39 tab-separated fields.
#[allow(unused)]
pub fn write_export(path: &Path, data_uv: &Array2<f64>) {
    let mut text = String::from("% OpenBCI-style export\n% Sample Rate = 250 Hz\n");
    for t in 0..data_uv.ncols() {
        let mut fields = vec!["12:00:00.000".to_string(), "0".into(), t.to_string()];
        for c in 0..35 {
            if c < data_uv.nrows() {
                fields.push(format!("{:.4}", data_uv[[c, t]]));
            } else {
                fields.push("0".into());
            }
        }
        fields.push("0".into());
        text.push_str(&fields.join("\t"));
        text.push('\n');
    }
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(|u| u.to_le_bytes()));
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

#[allow(unused)]
/// Maximum absolute difference between two arrays.
pub fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

#[allow(unused)]
pub fn rms(x: &[f64]) -> f64 {
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}
