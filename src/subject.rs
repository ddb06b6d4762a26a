//! Subject identifiers, study groups and the on-disk naming convention.
//!
//! Every pipeline recovers the subject from a file or directory name and the
//! group from the subject id, so these helpers are the only place where the
//! convention is spelled out.
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SubjectError {
    #[error("no alphanumeric characters in subject label '{0}'")]
    Empty(String),
}

/// BIDS-safe subject label, e.g. `T001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    /// Normalise a label: drop a leading `sub-`, then every non-alphanumeric
    /// character (`"T-001"` → `"T001"`).
    pub fn parse(label: &str) -> Result<Self, SubjectError> {
        let body = label.trim();
        let body = body.strip_prefix("sub-").unwrap_or(body);
        let id: String = body.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if id.is_empty() {
            return Err(SubjectError::Empty(label.to_string()));
        }
        Ok(Self(id))
    }

    /// Subject of a derived file: the first `_`-separated token of the stem.
    ///
    /// `"T001_task-rest_connectome_eeg.csv"` → `T001`,
    /// `"sub-C046_task-rest_cleaned_eeg.safetensors"` → `C046`.
    pub fn from_file_name(path: &Path) -> Result<Self, SubjectError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let stem = name.split('.').next().unwrap_or_default();
        let stem = stem.strip_prefix("sub-").unwrap_or(stem);
        Self::parse(stem.split('_').next().unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// BIDS directory name, `sub-<id>`.
    pub fn bids_dir(&self) -> String {
        format!("sub-{}", self.0)
    }

    pub fn group(&self) -> Group {
        Group::of(self)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Study group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Test,
    Control,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Test, Group::Control];

    /// `T…` subjects are in the test group, everybody else is a control.
    pub fn of(id: &SubjectId) -> Group {
        if id.as_str().starts_with('T') {
            Group::Test
        } else {
            Group::Control
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Test => "test",
            Group::Control => "control",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted subjects of a BIDS dataset (`sub-*` directories under `root`).
pub fn list_bids_subjects(root: &Path) -> Result<Vec<SubjectId>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("listing BIDS root {}", root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with("sub-") {
            if let Ok(id) = SubjectId::parse(name) {
                out.push(id);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Drop subjects ordered before `start` (inclusive resume point).
pub fn resume_from(subjects: Vec<SubjectId>, start: Option<&str>) -> Result<Vec<SubjectId>> {
    let Some(start) = start else { return Ok(subjects) };
    let start = SubjectId::parse(start)?;
    let pos = subjects
        .iter()
        .position(|s| *s == start)
        .with_context(|| format!("resume subject {start} not found"))?;
    Ok(subjects.into_iter().skip(pos).collect())
}

/// File layout of one subject inside a BIDS dataset.
#[derive(Debug, Clone)]
pub struct BidsPath {
    pub root: PathBuf,
    pub subject: SubjectId,
    pub task: String,
}

impl BidsPath {
    pub fn new(root: impl Into<PathBuf>, subject: SubjectId, task: impl Into<String>) -> Self {
        Self { root: root.into(), subject, task: task.into() }
    }

    /// `<root>/sub-<id>/eeg`
    pub fn eeg_dir(&self) -> PathBuf {
        self.root.join(self.subject.bids_dir()).join("eeg")
    }

    /// `sub-<id>_task-<task>`
    pub fn basename(&self) -> String {
        format!("{}_task-{}", self.subject.bids_dir(), self.task)
    }

    /// `<eeg_dir>/sub-<id>_task-<task>_<suffix>`
    pub fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.eeg_dir().join(format!("{}_{suffix}", self.basename()))
    }

    pub fn vhdr(&self) -> PathBuf {
        self.with_suffix("eeg.vhdr")
    }

    pub fn cleaned(&self) -> PathBuf {
        self.with_suffix("cleaned_eeg.safetensors")
    }
}

/// `<dir>/<band>/<group>/<id>_task-<task>_connectome_eeg.csv`
pub fn connectome_path(dir: &Path, band: &str, subject: &SubjectId, task: &str) -> PathBuf {
    dir.join(band)
        .join(subject.group().as_str())
        .join(format!("{subject}_task-{task}_connectome_eeg.csv"))
}
