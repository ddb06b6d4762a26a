//! Functional connectomes from cleaned recordings.
//!
//! - [`dpss`]: Slepian tapers for multitaper spectra.
//! - [`spectral`]: pairwise connectivity estimators.
//! - [`matrix`]: connectome CSV files.
//!
//! Per subject and band:
//!
//! ```text
//! cleaned file → band-pass fmin–fmax → crop n_epochs · epoch_dur around the
//! midpoint → epoch_dur epochs → spectral_connectivity → <band>/<group>/*.csv
//! ```
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub mod dpss;
pub mod matrix;
pub mod spectral;

pub use dpss::dpss_windows;
pub use matrix::{format_sci, read_connectome, write_connectome};
pub use spectral::{spectral_connectivity, SpectralParams};

use crate::batch::{run_parallel, BatchReport};
use crate::config::{Band, ConnectivityConfig, StudyConfig};
use crate::epoch::make_fixed_length_epochs;
use crate::filter::filter_raw;
use crate::io::load_cleaned;
use crate::raw::{ChannelType, Raw};
use crate::subject::{connectome_path, list_bids_subjects, BidsPath, SubjectId};

/// Connectivity estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityMethod {
    /// Magnitude coherence.
    Coh,
    /// Phase-locking value.
    Plv,
    /// Phase-lag index.
    Pli,
    /// Weighted phase-lag index.
    Wpli,
    /// Debiased estimator of the squared weighted phase-lag index.
    Wpli2Debiased,
}

impl fmt::Display for ConnectivityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectivityMethod::Coh => "coh",
            ConnectivityMethod::Plv => "plv",
            ConnectivityMethod::Pli => "pli",
            ConnectivityMethod::Wpli => "wpli",
            ConnectivityMethod::Wpli2Debiased => "wpli2_debiased",
        })
    }
}

/// How frequency bins inside a band collapse to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduce {
    Mean,
    First,
}

impl From<&ConnectivityConfig> for SpectralParams {
    fn from(c: &ConnectivityConfig) -> Self {
        Self {
            method: c.method,
            mt_bandwidth: c.mt_bandwidth,
            mt_low_bias: c.mt_low_bias,
            reduce: c.reduce,
        }
    }
}

/// Connectome of one band from an already loaded recording.
pub fn band_connectome(raw: &Raw, band: &Band, cfg: &ConnectivityConfig) -> Result<ndarray::Array2<f64>> {
    let mut raw = raw.clone();
    filter_raw(&mut raw, Some(band.fmin), Some(band.fmax), &[ChannelType::Eeg])?;
    raw.crop_around_middle(cfg.n_epochs as f64 * cfg.epoch_dur)?;
    let picks = raw.info.picks(ChannelType::Eeg, false);
    let epochs = make_fixed_length_epochs(&raw.get_data(&picks), raw.sfreq(), cfg.epoch_dur, 0.0)?;
    debug!(
        "{}: {} epochs × {} channels × {} samples",
        band.name,
        epochs.shape()[0],
        epochs.shape()[1],
        epochs.shape()[2]
    );
    spectral_connectivity(&epochs, raw.sfreq(), band.fmin, band.fmax, &SpectralParams::from(cfg))
}

/// Compute and write every band's connectome for one subject.
pub fn connect_subject(
    bids_root: &Path,
    out_dir: &Path,
    subject: &SubjectId,
    task: &str,
    cfg: &ConnectivityConfig,
) -> Result<()> {
    let cleaned = BidsPath::new(bids_root, subject.clone(), task).cleaned();
    let raw = load_cleaned(&cleaned).with_context(|| format!("loading {}", cleaned.display()))?;
    for band in &cfg.bands {
        let con = band_connectome(&raw, band, cfg).with_context(|| format!("band {}", band.name))?;
        let path = connectome_path(out_dir, &band.name, subject, task);
        write_connectome(&path, &con)?;
        info!("{subject}: {} connectome saved as {}", band.name, path.display());
    }
    Ok(())
}

/// Connectomes for every subject of the dataset.
pub fn run(cfg: &StudyConfig) -> Result<BatchReport> {
    let subjects = list_bids_subjects(&cfg.paths.bids_root)?;
    info!(
        "estimating {} connectomes for {} subject(s), bands {:?}",
        cfg.connectivity.method,
        subjects.len(),
        cfg.connectivity.bands.iter().map(|b| b.name.as_str()).collect::<Vec<_>>()
    );
    let report = run_parallel(&subjects, cfg.connectivity.workers, |subject| {
        connect_subject(
            &cfg.paths.bids_root,
            &cfg.paths.connectome_dir,
            subject,
            &cfg.convert.task,
            &cfg.connectivity,
        )
    })?;
    report.log_summary("connectivity");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip_through_yaml() {
        let m: ConnectivityMethod = serde_yaml::from_str("wpli2_debiased").unwrap();
        assert_eq!(m, ConnectivityMethod::Wpli2Debiased);
        assert_eq!(m.to_string(), "wpli2_debiased");
        let r: Reduce = serde_yaml::from_str("first").unwrap();
        assert_eq!(r, Reduce::First);
    }
}
