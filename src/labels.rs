//! Channel label mapping for vendor exports.
//!
//! `labels.csv` maps export columns (`C001`…`C035`) to electrode labels and
//! channel types:
//!
//! ```text
//! label,channel,description
//! Fp1,C001,eeg
//! EOG1,C020,eog
//! ```
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::raw::ChannelType;

#[derive(Debug, Deserialize)]
struct LabelRow {
    label: String,
    channel: String,
    description: String,
}

/// One kept channel: export column → label + type.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEntry {
    pub label: String,
    pub column: String,
    pub kind: ChannelType,
}

/// Ordered list of kept channels.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    pub entries: Vec<LabelEntry>,
}

impl LabelMap {
    /// Read the mapping, keeping rows whose description is one of `keep`.
    ///
    /// Descriptions that are not channel types (`photic`, `trigger`, …) are
    /// skipped.
    pub fn load(path: &Path, keep: &[ChannelType]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening label map {}", path.display()))?;
        let mut entries = Vec::new();
        for (row_no, row) in reader.deserialize::<LabelRow>().enumerate() {
            let row = row.with_context(|| format!("{}: row {}", path.display(), row_no + 2))?;
            let Ok(kind) = row.description.parse::<ChannelType>() else {
                continue;
            };
            if keep.contains(&kind) {
                entries.push(LabelEntry { label: row.label, column: row.channel, kind });
            }
        }
        anyhow::ensure!(!entries.is_empty(), "no usable channels in {}", path.display());
        Ok(Self { entries })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
