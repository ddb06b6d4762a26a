//! In-memory continuous recording.
//!
//! [`Raw`] plays the role of MNE's `RawArray`: a `[C, T]` matrix in volts plus
//! the channel metadata needed by the pipelines (name, type, position, bads).
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

/// Channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Eeg,
    Eog,
    Ecg,
    Emg,
    Misc,
}

impl ChannelType {
    /// Lower-case name (`"eeg"`).
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Eeg => "eeg",
            ChannelType::Eog => "eog",
            ChannelType::Ecg => "ecg",
            ChannelType::Emg => "emg",
            ChannelType::Misc => "misc",
        }
    }

    /// Upper-case BIDS name (`"EEG"`).
    pub fn bids_name(self) -> &'static str {
        match self {
            ChannelType::Eeg => "EEG",
            ChannelType::Eog => "EOG",
            ChannelType::Ecg => "ECG",
            ChannelType::Emg => "EMG",
            ChannelType::Misc => "MISC",
        }
    }
}

impl FromStr for ChannelType {
    type Err = anyhow::Error;

    /// Case-insensitive; accepts BIDS spellings (`VEOG`, `HEOG`).
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "eeg" => ChannelType::Eeg,
            "eog" | "veog" | "heog" => ChannelType::Eog,
            "ecg" | "ekg" => ChannelType::Ecg,
            "emg" => ChannelType::Emg,
            "misc" => ChannelType::Misc,
            other => bail!("unknown channel type '{other}'"),
        })
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One channel's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelType,
    /// Head-frame position in metres, if known.
    pub pos: Option<[f64; 3]>,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelType) -> Self {
        Self { name: name.into(), kind, pos: None }
    }
}

/// Measurement info.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub sfreq: f64,
    pub channels: Vec<Channel>,
    /// Names of channels flagged as bad.
    pub bads: Vec<String>,
}

impl Info {
    pub fn new(sfreq: f64, channels: Vec<Channel>) -> Self {
        Self { sfreq, channels, bads: Vec::new() }
    }

    pub fn n_chan(&self) -> usize {
        self.channels.len()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of `name`, case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn is_bad(&self, name: &str) -> bool {
        self.bads.iter().any(|b| b.eq_ignore_ascii_case(name))
    }

    /// Indices of channels of `kind`, optionally skipping bads.
    pub fn picks(&self, kind: ChannelType, exclude_bads: bool) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind && !(exclude_bads && self.is_bad(&c.name)))
            .map(|(i, _)| i)
            .collect()
    }
}

/// A continuous multichannel recording, `data` in volts, shape `[C, T]`.
#[derive(Debug, Clone)]
pub struct Raw {
    pub data: Array2<f64>,
    pub info: Info,
}

impl Raw {
    pub fn new(data: Array2<f64>, info: Info) -> Result<Self> {
        if data.nrows() != info.n_chan() {
            bail!(
                "data has {} rows but info lists {} channels",
                data.nrows(),
                info.n_chan()
            );
        }
        if !(info.sfreq > 0.0) {
            bail!("sampling rate must be positive, got {}", info.sfreq);
        }
        Ok(Self { data, info })
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn sfreq(&self) -> f64 {
        self.info.sfreq
    }

    /// Time of the last sample in seconds (MNE's `raw.times[-1]`).
    pub fn duration(&self) -> f64 {
        self.n_times().saturating_sub(1) as f64 / self.info.sfreq
    }

    /// Sample times in seconds.
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times()).map(|i| i as f64 / self.info.sfreq).collect()
    }

    /// Keep samples with `tmin <= t <= tmax`; both bounds are clamped to the
    /// recording.
    pub fn crop(&mut self, tmin: f64, tmax: f64) -> Result<()> {
        if tmax < tmin {
            bail!("crop: tmax ({tmax}) < tmin ({tmin})");
        }
        let sf = self.info.sfreq;
        let last = self.n_times().saturating_sub(1);
        let start = ((tmin.max(0.0) * sf).round() as usize).min(last);
        let stop = ((tmax * sf).round().max(0.0) as usize).min(last);
        self.data = self.data.slice(s![.., start..=stop]).to_owned();
        Ok(())
    }

    /// Crop to `length` seconds centred on the recording midpoint.
    pub fn crop_around_middle(&mut self, length: f64) -> Result<()> {
        let total = self.duration();
        let mid = total / 2.0;
        let half = length / 2.0;
        self.crop((mid - half).max(0.0), (mid + half).min(total))
    }

    /// Keep channels whose type is in `kinds`, dropping names in `exclude`
    /// (case-insensitive). Bad flags of dropped channels are removed.
    pub fn pick_types(&mut self, kinds: &[ChannelType], exclude: &[String]) {
        let keep: Vec<usize> = self
            .info
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                kinds.contains(&c.kind)
                    && !exclude.iter().any(|e| e.eq_ignore_ascii_case(&c.name))
            })
            .map(|(i, _)| i)
            .collect();
        self.pick_indices(&keep);
    }

    /// Keep the rows at `idx`, in that order.
    pub fn pick_indices(&mut self, idx: &[usize]) {
        self.data = self.data.select(ndarray::Axis(0), idx);
        let channels: Vec<Channel> = idx.iter().map(|&i| self.info.channels[i].clone()).collect();
        self.info.bads.retain(|b| channels.iter().any(|c| c.name.eq_ignore_ascii_case(b)));
        self.info.channels = channels;
    }

    /// Replace NaN with 0 and ±inf with the largest finite values.
    pub fn nan_to_num(&mut self) {
        self.data.mapv_inplace(|v| {
            if v.is_nan() {
                0.0
            } else if v == f64::INFINITY {
                f64::MAX
            } else if v == f64::NEG_INFINITY {
                f64::MIN
            } else {
                v
            }
        });
    }

    /// Rows of channels of `kind` as an owned `[n, T]` array.
    pub fn get_data(&self, picks: &[usize]) -> Array2<f64> {
        self.data.select(ndarray::Axis(0), picks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy(n_ch: usize, n_t: usize, sfreq: f64) -> Raw {
        let channels = (0..n_ch)
            .map(|i| Channel::new(format!("Ch{i}"), if i == 0 { ChannelType::Eog } else { ChannelType::Eeg }))
            .collect();
        let data = Array2::from_shape_fn((n_ch, n_t), |(c, t)| (c * 1000 + t) as f64);
        Raw::new(data, Info::new(sfreq, channels)).unwrap()
    }

    #[test]
    fn crop_is_inclusive() {
        let mut raw = toy(2, 1000, 100.0);
        raw.crop(1.0, 2.0).unwrap();
        assert_eq!(raw.n_times(), 101);
        assert_eq!(raw.data[[0, 0]], 100.0);
    }

    #[test]
    fn crop_around_middle_clamps() {
        let mut raw = toy(1, 1001, 100.0); // 10 s
        raw.crop_around_middle(600.0).unwrap();
        assert_eq!(raw.n_times(), 1001);

        let mut raw = toy(1, 1001, 100.0);
        raw.crop_around_middle(2.0).unwrap();
        assert_eq!(raw.n_times(), 201);
        assert_eq!(raw.data[[0, 0]], 400.0);
    }

    #[test]
    fn pick_types_excludes_by_name() {
        let mut raw = toy(4, 10, 100.0);
        raw.info.bads = vec!["Ch1".into(), "Ch0".into()];
        raw.pick_types(&[ChannelType::Eeg], &["ch3".into()]);
        assert_eq!(raw.info.ch_names(), vec!["Ch1", "Ch2"]);
        assert_eq!(raw.info.bads, vec!["Ch1".to_string()]);
        assert_eq!(raw.data[[1, 0]], 2000.0);
    }

    #[test]
    fn nan_to_num_replaces_non_finite() {
        let mut raw = toy(1, 3, 100.0);
        raw.data[[0, 0]] = f64::NAN;
        raw.data[[0, 1]] = f64::INFINITY;
        raw.nan_to_num();
        assert_eq!(raw.data[[0, 0]], 0.0);
        assert_eq!(raw.data[[0, 1]], f64::MAX);
    }

    #[test]
    fn channel_type_parsing() {
        assert_eq!("EEG".parse::<ChannelType>().unwrap(), ChannelType::Eeg);
        assert_eq!("VEOG".parse::<ChannelType>().unwrap(), ChannelType::Eog);
        assert!("photic".parse::<ChannelType>().is_err());
    }
}
