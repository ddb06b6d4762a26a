//! Study configuration.
//!
//! [`StudyConfig`] holds every tunable parameter of the four pipelines.
//! All fields have defaults that match the settings used for the study, so an
//! empty YAML file (or no file at all) runs the study as configured.
//!
//! ```
//! use pedconn::config::{StudyConfig, CleanConfig};
//!
//! let cfg = StudyConfig {
//!     clean: CleanConfig { n_components: 15, ..CleanConfig::default() },
//!     ..StudyConfig::default()
//! };
//! assert_eq!(cfg.clean.l_freq, 1.0);
//! ```
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::connectivity::{ConnectivityMethod, Reduce};
use crate::raw::ChannelType;

/// Top-level configuration, one section per pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub paths: PathsConfig,
    pub convert: ConvertConfig,
    pub clean: CleanConfig,
    pub connectivity: ConnectivityConfig,
    pub metrics: MetricsConfig,
}

impl StudyConfig {
    /// Load configuration from a YAML file. Missing keys fall back to defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("writing config {}", path.as_ref().display()))
    }
}

/// Directory layout of the study.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Vendor exports, one sub-directory per group (`control/`, `test/`).
    pub export_dir: PathBuf,
    /// Root of the BIDS dataset (raw recordings and cleaned files).
    pub bids_root: PathBuf,
    /// Channel label mapping CSV (`label,channel,description`).
    pub labels_csv: PathBuf,
    /// Connectome output root; matrices land in `<dir>/<band>/<group>/`.
    pub connectome_dir: PathBuf,
    /// Demographics CSVs with an `id` column, concatenated in order.
    pub demographics: Vec<PathBuf>,
    /// Metrics table output.
    pub metrics_csv: PathBuf,
    /// Group comparison table output.
    pub comparison_csv: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("data/export"),
            bids_root: PathBuf::from("data/bids"),
            labels_csv: PathBuf::from("support_files/labels.csv"),
            connectome_dir: PathBuf::from("data/connectomes"),
            demographics: vec![
                PathBuf::from("data/demographics_test.csv"),
                PathBuf::from("data/demographics_control.csv"),
            ],
            metrics_csv: PathBuf::from("data/connectome_metrics.csv"),
            comparison_csv: PathBuf::from("data/connectome_ttest.csv"),
        }
    }
}

/// Vendor export → BIDS conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Sampling rate of the export in Hz (the text format does not carry it).
    ///
    /// Default: `250.0` Hz.
    pub sfreq: f64,

    /// Multiplier applied to every exported value.
    ///
    /// The exporter writes microvolts; the default converts to volts.
    ///
    /// Default: `1e-6`.
    pub scale: f64,

    /// Channel types kept from the label map.
    ///
    /// Default: EEG, EOG, EMG, ECG.
    pub keep_types: Vec<ChannelType>,

    /// BIDS task label.
    ///
    /// Default: `"rest"`.
    pub task: String,

    /// Power line frequency written to the `_eeg.json` sidecar.
    ///
    /// Default: `50.0` Hz.
    pub line_freq: f64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            sfreq: 250.0,
            scale: 1e-6,
            keep_types: vec![
                ChannelType::Eeg,
                ChannelType::Eog,
                ChannelType::Emg,
                ChannelType::Ecg,
            ],
            task: "rest".into(),
            line_freq: 50.0,
        }
    }
}

/// Automated artifact cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Band-pass lower edge in Hz. Default: `1.0`.
    pub l_freq: f64,
    /// Band-pass upper edge in Hz. Default: `40.0`.
    pub h_freq: f64,

    /// Epoch length used for rejection-threshold estimation, in seconds.
    /// Default: `1.0`.
    pub reject_epoch_dur: f64,
    /// Overlap between those epochs, in seconds. Default: `0.5`.
    pub reject_overlap: f64,
    /// Cross-validation folds for threshold selection. Default: `5`.
    pub reject_cv: usize,

    /// A channel named in the drop log of at least this fraction of epochs is
    /// marked bad and interpolated.
    ///
    /// Default: `0.5`.
    pub bad_channel_fraction: f64,

    /// Number of ICA components. Capped at the number of good EEG channels.
    /// Default: `20`.
    pub n_components: usize,
    /// FastICA iteration limit. Default: `1000`.
    pub max_iter: usize,
    /// FastICA convergence tolerance. Default: `1e-4`.
    pub tol: f64,
    /// Seed of the ICA unmixing initialisation. Default: `97`.
    pub random_state: u64,

    /// |z| threshold for EOG-correlated components. Default: `3.0`.
    pub eog_threshold: f64,
    /// |z| threshold for ECG-correlated components. Default: `3.0`.
    pub ecg_threshold: f64,

    /// Length of the retained segment, centred on the recording midpoint,
    /// in seconds.
    ///
    /// Default: `600.0` s.
    pub crop_duration: f64,

    /// EEG channels dropped before saving. Default: `["A1", "A2"]`.
    pub exclude: Vec<String>,

    /// Start processing at this subject (sorted order); earlier subjects are
    /// skipped. Useful to resume an interrupted run.
    pub resume_from: Option<String>,

    /// Worker threads (`None` = one per core).
    pub workers: Option<usize>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            l_freq: 1.0,
            h_freq: 40.0,
            reject_epoch_dur: 1.0,
            reject_overlap: 0.5,
            reject_cv: 5,
            bad_channel_fraction: 0.5,
            n_components: 20,
            max_iter: 1000,
            tol: 1e-4,
            random_state: 97,
            eog_threshold: 3.0,
            ecg_threshold: 3.0,
            crop_duration: 600.0,
            exclude: vec!["A1".into(), "A2".into()],
            resume_from: None,
            workers: None,
        }
    }
}

/// A named frequency band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub fmin: f64,
    pub fmax: f64,
}

/// Connectome estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Bands to estimate. Default: extended alpha, 7–14 Hz.
    pub bands: Vec<Band>,

    /// Epoch length in seconds. Default: `12.0`.
    pub epoch_dur: f64,

    /// Number of epochs kept around the recording midpoint. Default: `100`.
    pub n_epochs: usize,

    /// Connectivity estimator. Default: debiased squared wPLI.
    pub method: ConnectivityMethod,

    /// Multitaper bandwidth in Hz; `None` uses a time-half-bandwidth
    /// product of 4.
    pub mt_bandwidth: Option<f64>,

    /// Keep only tapers with concentration above 0.9. Default: `true`.
    pub mt_low_bias: bool,

    /// How frequency bins inside a band are collapsed. Default: the first
    /// bin, as in the published connectomes; `mean` averages the band.
    pub reduce: Reduce,

    /// Worker threads (`None` = one per core).
    pub workers: Option<usize>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            bands: vec![Band { name: "alpha".into(), fmin: 7.0, fmax: 14.0 }],
            epoch_dur: 12.0,
            n_epochs: 100,
            method: ConnectivityMethod::Wpli2Debiased,
            mt_bandwidth: None,
            mt_low_bias: true,
            reduce: Reduce::First,
            workers: None,
        }
    }
}

/// Graph metrics and group comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Band sub-directory of the connectome root to analyse.
    pub band: String,

    /// Row/column order of the connectome matrices.
    pub electrodes: Vec<String>,
    /// Left-hemisphere electrodes for interhemispheric strength.
    pub left: Vec<String>,
    /// Right-hemisphere electrodes for interhemispheric strength.
    pub right: Vec<String>,

    /// Louvain resolution parameter. Default: `1.0`.
    pub gamma: f64,
    /// Seed of the Louvain node order. Default: `0`.
    pub seed: u64,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            band: "alpha".into(),
            electrodes: names(&[
                "Fp1", "Fp2", "F3", "F4", "C3", "C4", "P3", "P4", "O1", "O2",
                "F7", "F8", "T3", "T4", "T5", "T6", "Fz", "Cz", "Pz",
            ]),
            left: names(&["Fp1", "F7", "F3", "T3", "C3", "T5", "P3", "O1"]),
            right: names(&["Fp2", "F8", "F4", "T4", "C4", "T6", "P4", "O2"]),
            gamma: 1.0,
            seed: 0,
        }
    }
}
