//! Average reference: subtract the mean across EEG channels at each time point.
//!
//! Matches `raw.set_eeg_reference('average', projection=False)`: the mean is
//! taken over good EEG channels only and subtracted from every EEG channel
//! (bad ones included). EOG/ECG/EMG rows are left alone.
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[good_eeg, t])`
use anyhow::{ensure, Result};
use ndarray::{Array1, Array2, Axis};

use crate::raw::{ChannelType, Raw};

/// Subtract the per-timepoint mean of all rows from every row.
pub fn average_reference_inplace(data: &mut Array2<f64>) {
    let Some(means) = data.mean_axis(Axis(0)) else { return };
    for mut row in data.rows_mut() {
        row -= &means;
    }
}

/// Apply an average EEG reference to `raw`. Returns the reference signal.
pub fn set_average_reference(raw: &mut Raw) -> Result<Array1<f64>> {
    let good = raw.info.picks(ChannelType::Eeg, true);
    ensure!(!good.is_empty(), "no good EEG channels to build an average reference");
    let reference = raw
        .data
        .select(Axis(0), &good)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(raw.n_times()));
    for c in raw.info.picks(ChannelType::Eeg, false) {
        let mut row = raw.data.row_mut(c);
        row -= &reference;
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{Channel, Info};

    #[test]
    fn channel_sum_is_zero_after_reference() {
        let mut data = Array2::from_shape_fn((8, 512), |(c, t)| ((c * 7 + t * 3) as f64).sin());
        average_reference_inplace(&mut data);
        for &s in data.sum_axis(Axis(0)).iter() {
            approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn reference_preserves_channel_differences() {
        // x[0] = 2, x[1] = 4 → mean = 3 → x[0]-x[1] is preserved.
        let mut data = Array2::from_shape_fn((2, 10), |(c, _)| if c == 0 { 2.0 } else { 4.0 });
        average_reference_inplace(&mut data);
        for t in 0..10 {
            approx::assert_abs_diff_eq!(data[[0, t]] - data[[1, t]], -2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn raw_reference_skips_bads_and_non_eeg() {
        let channels = vec![
            Channel::new("C3", ChannelType::Eeg),
            Channel::new("C4", ChannelType::Eeg),
            Channel::new("Cz", ChannelType::Eeg),
            Channel::new("EOG", ChannelType::Eog),
        ];
        let mut info = Info::new(100.0, channels);
        info.bads = vec!["Cz".into()];
        let data = Array2::from_shape_fn((4, 5), |(c, _)| [1.0, 3.0, 100.0, 7.0][c]);
        let mut raw = Raw::new(data, info).unwrap();

        let reference = set_average_reference(&mut raw).unwrap();
        approx::assert_abs_diff_eq!(reference[0], 2.0, epsilon = 1e-12);
        assert_eq!(raw.data[[0, 0]], -1.0);
        assert_eq!(raw.data[[1, 0]], 1.0);
        assert_eq!(raw.data[[2, 0]], 98.0); // bad channel re-referenced too
        assert_eq!(raw.data[[3, 0]], 7.0); // EOG untouched
    }
}
