//! Vendor export → BIDS conversion.
//!
//! ```text
//! <export_dir>/{control,test}/*.txt → read_export → 10-20 montage →
//! <bids_root>/sub-<id>/eeg/sub-<id>_task-<task>_eeg.vhdr (+ sidecars)
//! ```
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::batch::BatchReport;
use crate::bids::write_raw_bids;
use crate::config::{ConvertConfig, StudyConfig};
use crate::export::read_export;
use crate::labels::LabelMap;
use crate::subject::{BidsPath, Group, SubjectId};

/// One export file found under a group directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub path: PathBuf,
    pub subject: SubjectId,
    pub group: Group,
}

impl fmt::Display for ExportFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.subject, self.group)
    }
}

/// Every `*.txt` export under `<export_dir>/<group>/`, sorted by subject.
/// A missing group directory is skipped with a warning.
pub fn find_exports(export_dir: &Path) -> Result<Vec<ExportFile>> {
    let mut out = Vec::new();
    for group in [Group::Control, Group::Test] {
        let dir = export_dir.join(group.as_str());
        if !dir.is_dir() {
            warn!("no {group} directory at {}", dir.display());
            continue;
        }
        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let subject = match SubjectId::parse(stem) {
                Ok(s) => s,
                Err(e) => {
                    warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            if subject.group() != group {
                warn!("{subject} found under {group}/ but its id names the {} group", subject.group());
            }
            out.push(ExportFile { path, subject, group });
        }
    }
    out.sort_by(|a, b| a.subject.cmp(&b.subject));
    Ok(out)
}

/// Convert one export file into the BIDS dataset at `bids_root`.
pub fn convert_file(
    file: &ExportFile,
    labels: &LabelMap,
    bids_root: &Path,
    cfg: &ConvertConfig,
) -> Result<BidsPath> {
    let rec = read_export(&file.path, labels, cfg.scale)?;
    let raw = rec.into_raw(cfg.sfreq)?;
    let bids = BidsPath::new(bids_root, file.subject.clone(), cfg.task.as_str());
    write_raw_bids(&raw, &bids, cfg.line_freq)
        .with_context(|| format!("writing {}", bids.vhdr().display()))?;
    info!(
        "{}: {} channels × {:.1} s → {}",
        file.subject,
        raw.info.n_chan(),
        raw.duration(),
        bids.vhdr().display()
    );
    Ok(bids)
}

/// Convert every export of the study, in subject order. Runs sequentially:
/// all subjects share `participants.tsv`. The first unreadable or malformed
/// export aborts the run; subjects after it are not written.
pub fn run(cfg: &StudyConfig) -> Result<BatchReport> {
    let labels = LabelMap::load(&cfg.paths.labels_csv, &cfg.convert.keep_types)?;
    let files = find_exports(&cfg.paths.export_dir)?;
    info!(
        "converting {} export(s) from {} with {} labelled channels",
        files.len(),
        cfg.paths.export_dir.display(),
        labels.len()
    );
    let mut report = BatchReport::default();
    for file in &files {
        convert_file(file, &labels, &cfg.paths.bids_root, &cfg.convert)
            .with_context(|| format!("converting {file}"))?;
        report.succeeded.push(file.to_string());
    }
    report.log_summary("conversion");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_are_found_per_group() {
        let dir = tempfile::tempdir().unwrap();
        for (group, name) in [("test", "T-002.txt"), ("test", "T-001.txt"), ("control", "C-010.txt"), ("control", "notes.md")] {
            std::fs::create_dir_all(dir.path().join(group)).unwrap();
            std::fs::write(dir.path().join(group).join(name), b"").unwrap();
        }
        let files = find_exports(dir.path()).unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.subject.as_str()).collect();
        assert_eq!(ids, ["C010", "T001", "T002"]);
        assert_eq!(files[0].group, Group::Control);
        assert_eq!(files[2].group, Group::Test);
    }

    #[test]
    fn missing_group_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_exports(dir.path()).unwrap().is_empty());
    }
}
