//! Connectome CSV files.
//!
//! One row per line, comma-separated, no header, every value in
//! `numpy.savetxt`'s default `%.18e` notation (`1.250000000000000000e-01`).
use std::path::Path;

use anyhow::{ensure, Context, Result};
use ndarray::Array2;

/// Format like C's `%.18e`: two-digit minimum, signed exponent.
pub fn format_sci(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let s = format!("{v:.18e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
        }
        None => s,
    }
}

/// Write `matrix`, creating parent directories as needed.
pub fn write_connectome(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in matrix.rows() {
        w.write_record(row.iter().map(|&v| format_sci(v)))?;
    }
    w.flush()?;
    Ok(())
}

/// Read a matrix written by [`write_connectome`] (or `numpy.savetxt`).
/// Rows must all have the same length; squareness is not checked.
pub fn read_connectome(path: &Path) -> Result<Array2<f64>> {
    let mut r = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut values = Vec::new();
    let mut n_rows = 0;
    let mut n_cols = 0;
    for record in r.records() {
        let record = record.with_context(|| format!("parsing {}", path.display()))?;
        if n_rows == 0 {
            n_cols = record.len();
        }
        for (col, field) in record.iter().enumerate() {
            let v: f64 = field
                .parse()
                .with_context(|| format!("{}: row {}, column {}: '{field}'", path.display(), n_rows + 1, col + 1))?;
            values.push(v);
        }
        n_rows += 1;
    }
    ensure!(n_rows > 0, "{} is empty", path.display());
    Ok(Array2::from_shape_vec((n_rows, n_cols), values)?)
}
