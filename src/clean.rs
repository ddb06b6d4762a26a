//! Automated artifact cleanup pipeline.
//!
//! ```text
//! BIDS raw
//!   ├─ band-pass EEG        l_freq–h_freq (1–40 Hz)
//!   ├─ nan_to_num
//!   ├─ average reference
//!   ├─ 1 s epochs, 0.5 s overlap → global rejection threshold → drop log
//!   ├─ chronic offenders → bads → spherical-spline interpolation
//!   ├─ ICA fit → EOG + ECG components → apply with them excluded
//!   ├─ crop crop_duration (600 s) around the midpoint
//!   └─ keep EEG, drop A1/A2
//!        └─→ sub-<id>_task-<task>_cleaned_eeg.safetensors
//! ```
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::batch::{run_parallel, BatchReport};
use crate::bids::read_raw_bids;
use crate::config::{CleanConfig, StudyConfig};
use crate::epoch::make_fixed_length_epochs;
use crate::filter::filter_raw;
use crate::ica::{ArtifactError, Ica, IcaConfig};
use crate::interpolate::interpolate_bads;
use crate::io::save_cleaned;
use crate::raw::{ChannelType, Raw};
use crate::reference::set_average_reference;
use crate::reject::{bad_channels_from_drop_log, drop_bad, rejection_thresholds};
use crate::subject::{list_bids_subjects, resume_from, BidsPath, SubjectId};

/// What happened to one recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanSummary {
    pub n_epochs: usize,
    pub n_dropped: usize,
    /// Channels found bad and interpolated.
    pub interpolated: Vec<String>,
    pub eog_components: Vec<usize>,
    pub ecg_components: Vec<usize>,
    pub n_channels_out: usize,
    pub n_times_out: usize,
}

/// Component detection never aborts the recording: failures count as
/// "nothing found".
fn detected(what: &str, found: Result<Vec<usize>, ArtifactError>) -> Vec<usize> {
    match found {
        Ok(idx) => idx,
        Err(e) => {
            warn!("{what} artifact detection failed: {e}");
            Vec::new()
        }
    }
}

/// Run the cleanup chain on an in-memory recording.
pub fn clean_raw(mut raw: Raw, cfg: &CleanConfig) -> Result<(Raw, CleanSummary)> {
    let mut summary = CleanSummary::default();

    debug!("filtering {}–{} Hz", cfg.l_freq, cfg.h_freq);
    filter_raw(&mut raw, Some(cfg.l_freq), Some(cfg.h_freq), &[ChannelType::Eeg])?;
    raw.nan_to_num();
    set_average_reference(&mut raw)?;

    let epochs = make_fixed_length_epochs(&raw.data, raw.sfreq(), cfg.reject_epoch_dur, cfg.reject_overlap)?;
    let thresholds = rejection_thresholds(&epochs, &raw.info, &[ChannelType::Eeg], cfg.reject_cv);
    for (kind, tau) in &thresholds {
        debug!("rejection threshold {kind}: {tau:.3e}");
    }
    let log = drop_bad(&epochs, &raw.info, &thresholds);
    summary.n_epochs = log.n_epochs;
    summary.n_dropped = log.dropped.len();
    debug!("dropped {}/{} epochs ({:.1}%)", log.dropped.len(), log.n_epochs, log.drop_percentage());

    for name in bad_channels_from_drop_log(&log, &raw.info, cfg.bad_channel_fraction) {
        if !raw.info.is_bad(&name) {
            raw.info.bads.push(name);
        }
    }
    if !raw.info.bads.is_empty() {
        info!("interpolating bad channels {:?}", raw.info.bads);
        summary.interpolated = interpolate_bads(&mut raw)?;
    }

    let ica = Ica::fit(&raw, &IcaConfig::from(cfg))?;
    debug!("ICA: {} components, {} iterations", ica.n_components(), ica.n_iter);
    summary.eog_components = detected("EOG", ica.find_bads_eog(&raw, cfg.eog_threshold));
    summary.ecg_components = detected("ECG", ica.find_bads_ecg(&raw, cfg.ecg_threshold));
    info!(
        "excluding components EOG {:?}, ECG {:?}",
        summary.eog_components, summary.ecg_components
    );
    let mut exclude: Vec<usize> =
        summary.eog_components.iter().chain(&summary.ecg_components).copied().collect();
    exclude.sort_unstable();
    exclude.dedup();
    ica.apply(&mut raw, &exclude)?;

    raw.crop_around_middle(cfg.crop_duration)?;
    raw.pick_types(&[ChannelType::Eeg], &cfg.exclude);
    summary.n_channels_out = raw.info.n_chan();
    summary.n_times_out = raw.n_times();
    Ok((raw, summary))
}

/// Clean one subject of a BIDS dataset and write its cleaned file.
pub fn clean_subject(root: &Path, subject: &SubjectId, task: &str, cfg: &CleanConfig) -> Result<CleanSummary> {
    let bids = BidsPath::new(root, subject.clone(), task);
    let raw = read_raw_bids(&bids).with_context(|| format!("loading {}", bids.vhdr().display()))?;
    let (clean, summary) = clean_raw(raw, cfg)?;
    save_cleaned(&clean, &bids.cleaned())?;
    info!(
        "{subject}: saved {} ({} ch × {} samples)",
        bids.cleaned().display(),
        summary.n_channels_out,
        summary.n_times_out
    );
    Ok(summary)
}

/// Clean every subject of the dataset.
pub fn run(cfg: &StudyConfig) -> Result<BatchReport> {
    let root = &cfg.paths.bids_root;
    let subjects = list_bids_subjects(root)?;
    let subjects = resume_from(subjects, cfg.clean.resume_from.as_deref())?;
    info!("cleaning {} subject(s) under {}", subjects.len(), root.display());

    let report = run_parallel(&subjects, cfg.clean.workers, |subject| {
        clean_subject(root, subject, &cfg.convert.task, &cfg.clean).map(|_| ())
    })?;
    report.log_summary("cleanup");
    Ok(report)
}
