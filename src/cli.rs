//! Shared start-up for the pipeline binaries.
use std::path::Path;

use anyhow::{bail, Result};
use log::{info, warn};

use crate::batch::BatchReport;
use crate::config::StudyConfig;

/// `-v` → info, `-vv` → debug; warnings only by default.
pub fn init_logging(verbose: u8) {
    env_logger::Builder::new()
        .filter_level(match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();
}

/// Load the study configuration; an unreadable file falls back to defaults.
pub fn load_config(path: Option<&Path>) -> StudyConfig {
    match path {
        Some(path) => match StudyConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {e:#}, using defaults", path.display());
                StudyConfig::default()
            }
        },
        None => StudyConfig::default(),
    }
}

/// Print a report and turn failures into a non-zero exit.
pub fn finish(what: &str, report: &BatchReport) -> Result<()> {
    println!("{what}: {} of {} succeeded", report.succeeded.len(), report.total());
    if !report.is_clean() {
        bail!("{what}: {} item(s) failed", report.failed.len());
    }
    Ok(())
}
