//! Reader for the acquisition system's text export.
//!
//! The export is UTF-16 text. Lines starting with `%` are header comments;
//! every other non-empty line is one sample with 39 tab-separated fields:
//!
//! ```text
//! Date.Time  EB  Stamp  C001 … C035  PHOTIC
//! ```
//!
//! Only the columns named in the [`LabelMap`] are parsed.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use thiserror::Error;

use crate::labels::LabelMap;
use crate::montage;
use crate::raw::{Channel, Info, Raw};

/// Number of numbered signal columns (`C001`…`C035`).
pub const N_SIGNAL_COLUMNS: usize = 35;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{path}: odd byte count, not UTF-16")]
    OddLength { path: PathBuf },

    #[error("{path}: invalid UTF-16 at code unit {offset}")]
    InvalidUtf16 { path: PathBuf, offset: usize },

    #[error("{path}:{line}: expected {expected} fields, found {found}")]
    FieldCount { path: PathBuf, line: usize, expected: usize, found: usize },

    #[error("{path}:{line}: column {column}: cannot parse '{value}' as a number")]
    BadValue { path: PathBuf, line: usize, column: String, value: String },

    #[error("label map references unknown export column '{0}'")]
    UnknownColumn(String),

    #[error("{path}: no data rows")]
    Empty { path: PathBuf },
}

/// Column names of the export in file order.
pub fn export_columns() -> Vec<String> {
    let mut cols = vec!["Date.Time".to_string(), "EB".into(), "Stamp".into()];
    cols.extend((1..=N_SIGNAL_COLUMNS).map(|i| format!("C{i:03}")));
    cols.push("PHOTIC".into());
    cols
}

/// Decode UTF-16 bytes; a BOM selects the byte order, little-endian otherwise.
pub fn decode_utf16(bytes: &[u8], path: &Path) -> Result<String, ExportError> {
    if bytes.len() % 2 != 0 {
        return Err(ExportError::OddLength { path: path.to_path_buf() });
    }
    let (big_endian, body) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (true, rest),
        [0xFF, 0xFE, rest @ ..] => (false, rest),
        _ => (false, bytes),
    };
    let units = body.chunks_exact(2).map(|b| {
        if big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        }
    });
    let mut out = String::with_capacity(body.len() / 2);
    for (offset, ch) in char::decode_utf16(units).enumerate() {
        match ch {
            Ok(c) => out.push(c),
            Err(_) => {
                return Err(ExportError::InvalidUtf16 { path: path.to_path_buf(), offset })
            }
        }
    }
    Ok(out)
}

/// Parsed export restricted to the labelled channels.
#[derive(Debug, Clone)]
pub struct ExportRecording {
    /// `[C, T]`, already multiplied by the configured scale.
    pub data: Array2<f64>,
    pub channels: Vec<Channel>,
}

impl ExportRecording {
    /// Wrap as a [`Raw`] and attach standard 10-20 positions.
    pub fn into_raw(self, sfreq: f64) -> Result<Raw> {
        let mut info = Info::new(sfreq, self.channels);
        montage::set_montage(&mut info);
        Raw::new(self.data, info)
    }
}

/// Parse export text (already decoded).
pub fn parse_export(text: &str, labels: &LabelMap, scale: f64, path: &Path) -> Result<ExportRecording, ExportError> {
    let columns = export_columns();
    let picks: Vec<usize> = labels
        .entries
        .iter()
        .map(|e| {
            columns
                .iter()
                .position(|c| c == &e.column)
                .ok_or_else(|| ExportError::UnknownColumn(e.column.clone()))
        })
        .collect::<Result<_, _>>()?;

    let mut samples: Vec<f64> = Vec::new();
    let mut n_rows = 0usize;
    for (line_no, line) in text.lines().enumerate() {
        if line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() != columns.len() {
            return Err(ExportError::FieldCount {
                path: path.to_path_buf(),
                line: line_no + 1,
                expected: columns.len(),
                found: fields.len(),
            });
        }
        for &p in &picks {
            let raw = fields[p].trim();
            let v: f64 = raw.parse().map_err(|_| ExportError::BadValue {
                path: path.to_path_buf(),
                line: line_no + 1,
                column: columns[p].clone(),
                value: raw.to_string(),
            })?;
            samples.push(v * scale);
        }
        n_rows += 1;
    }
    if n_rows == 0 {
        return Err(ExportError::Empty { path: path.to_path_buf() });
    }

    // Rows were pushed sample-major: [T, C] → [C, T].
    let n_ch = picks.len();
    let data = Array2::from_shape_fn((n_ch, n_rows), |(c, t)| samples[t * n_ch + c]);
    let channels = labels
        .entries
        .iter()
        .map(|e| Channel::new(e.label.clone(), e.kind))
        .collect();
    Ok(ExportRecording { data, channels })
}

/// Read and parse one export file.
pub fn read_export(path: &Path, labels: &LabelMap, scale: f64) -> Result<ExportRecording> {
    let bytes = std::fs::read(path).with_context(|| format!("reading export {}", path.display()))?;
    let text = decode_utf16(&bytes, path)?;
    Ok(parse_export(&text, labels, scale, path)?)
}
