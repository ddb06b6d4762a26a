//! Graph metrics per connectome and the two-group comparison.
//!
//! ```text
//! <connectome_dir>/<band>/{test,control}/*.csv
//!   → ihs, global efficiency, Louvain modularity per subject
//!   → left join with demographics on id   → metrics table
//!   → Student t-test test vs control       → comparison table
//! ```
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use ndarray::Array2;
use serde::Serialize;

use crate::config::{MetricsConfig, StudyConfig};
use crate::connectivity::read_connectome;
use crate::graph::{community_louvain, global_efficiency, interhemispheric_strength};
use crate::stats::{mean, ttest_ind};
use crate::subject::{Group, SubjectId};

/// Metric columns, in table order.
pub const METRICS: [&str; 3] = ["ihs", "ge", "modularity"];

/// Metrics of one subject's connectome.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub id: SubjectId,
    pub group: Group,
    pub ihs: f64,
    pub ge: f64,
    pub modularity: f64,
}

impl MetricsRow {
    pub fn metric(&self, name: &str) -> f64 {
        match name {
            "ihs" => self.ihs,
            "ge" => self.ge,
            "modularity" => self.modularity,
            _ => f64::NAN,
        }
    }
}

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub metric: String,
    pub n_test: usize,
    pub n_control: usize,
    pub mean_test: f64,
    pub mean_control: f64,
    pub t: f64,
    pub p: f64,
}

/// Reject matrices the metrics cannot be computed on.
pub fn check_connectome(w: &Array2<f64>, n_electrodes: usize) -> Result<()> {
    ensure!(w.is_square(), "matrix is not square: {:?}", w.dim());
    ensure!(w.iter().all(|v| v.is_finite()), "matrix contains non-finite values");
    ensure!(
        w.nrows() >= n_electrodes,
        "matrix has {} rows, the electrode layout has {n_electrodes}",
        w.nrows()
    );
    Ok(())
}

fn or_nan(id: &SubjectId, metric: &str, value: Result<f64>) -> f64 {
    value.unwrap_or_else(|e| {
        warn!("{id}: {metric} failed: {e:#}");
        f64::NAN
    })
}

/// Compute every metric of a validated connectome. Metric failures give NaN.
pub fn connectome_metrics(id: SubjectId, group: Group, w: &Array2<f64>, cfg: &MetricsConfig) -> MetricsRow {
    let ihs = or_nan(&id, "ihs", interhemispheric_strength(w, &cfg.electrodes, &cfg.left, &cfg.right));
    let ge = or_nan(&id, "ge", global_efficiency(w));
    let modularity = or_nan(&id, "modularity", community_louvain(w, cfg.gamma, cfg.seed).map(|(_, q)| q));
    MetricsRow { id, group, ihs, ge, modularity }
}

/// Sorted `*.csv` files of one directory; a missing directory is empty.
fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!("no connectome directory {}", dir.display());
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Metrics for every connectome under `<band_dir>/{test,control}/`.
/// Degenerate matrices are skipped with a warning.
pub fn collect_metrics(band_dir: &Path, cfg: &MetricsConfig) -> Result<Vec<MetricsRow>> {
    let mut rows = Vec::new();
    for group in Group::ALL {
        let files = csv_files(&band_dir.join(group.as_str()))?;
        info!("{group}: {} connectome(s)", files.len());
        for file in files {
            let id = match SubjectId::from_file_name(&file) {
                Ok(id) => id,
                Err(e) => {
                    warn!("skipping {}: {e}", file.display());
                    continue;
                }
            };
            if id.group() != group {
                warn!("{id}: stored under {group}/ but its id names the {} group", id.group());
            }
            let w = match read_connectome(&file).and_then(|w| check_connectome(&w, cfg.electrodes.len()).map(|_| w)) {
                Ok(w) => w,
                Err(e) => {
                    warn!("skipping {}: {e:#}", file.display());
                    continue;
                }
            };
            let row = connectome_metrics(id, group, &w, cfg);
            debug!("{}: ihs {:.4}, ge {:.4}, Q {:.4}", row.id, row.ihs, row.ge, row.modularity);
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Demographic fields keyed by normalised subject id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demographics {
    /// Every non-`id` column, in order of first appearance.
    pub columns: Vec<String>,
    rows: HashMap<SubjectId, HashMap<String, String>>,
}

impl Demographics {
    /// Concatenate CSV files that each carry an `id` column.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut out = Self::default();
        for path in paths {
            out.append(path)?;
        }
        Ok(out)
    }

    fn append(&mut self, path: &Path) -> Result<()> {
        let mut r = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening demographics {}", path.display()))?;
        let headers = r.headers()?.clone();
        let id_col = headers
            .iter()
            .position(|h| h == "id")
            .with_context(|| format!("{}: no 'id' column", path.display()))?;
        for h in headers.iter().filter(|h| *h != "id") {
            if !self.columns.iter().any(|c| c == h) {
                self.columns.push(h.to_string());
            }
        }
        for record in r.records() {
            let record = record.with_context(|| format!("parsing {}", path.display()))?;
            let raw_id = record.get(id_col).unwrap_or_default();
            let Ok(id) = SubjectId::parse(raw_id) else {
                warn!("{}: unusable id '{raw_id}'", path.display());
                continue;
            };
            if self.rows.contains_key(&id) {
                warn!("{}: duplicate demographics for {id}, keeping the first", path.display());
                continue;
            }
            let fields = headers
                .iter()
                .zip(record.iter())
                .filter(|(h, _)| *h != "id")
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            self.rows.insert(id, fields);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of `id` in [`columns`](Self::columns) order; empty when absent.
    pub fn fields(&self, id: &SubjectId) -> Vec<&str> {
        let row = self.rows.get(id);
        self.columns
            .iter()
            .map(|c| row.and_then(|r| r.get(c)).map_or("", String::as_str))
            .collect()
    }
}

/// Write `id, group, ihs, ge, modularity, <demographic columns>`.
pub fn write_metrics_table(path: &Path, rows: &[MetricsRow], demographics: &Demographics) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec!["id", "group"];
    header.extend(METRICS);
    header.extend(demographics.columns.iter().map(String::as_str));
    w.write_record(&header)?;
    for row in rows {
        let mut record = vec![row.id.to_string(), row.group.to_string()];
        record.extend(METRICS.iter().map(|m| row.metric(m).to_string()));
        record.extend(demographics.fields(&row.id).into_iter().map(str::to_string));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Test vs control t-test for every metric. NaN values are left out.
pub fn compare_groups(rows: &[MetricsRow]) -> Vec<Comparison> {
    METRICS
        .iter()
        .map(|&metric| {
            let values = |g: Group| -> Vec<f64> {
                rows.iter()
                    .filter(|r| r.group == g)
                    .map(|r| r.metric(metric))
                    .filter(|v| !v.is_nan())
                    .collect()
            };
            let (test, control) = (values(Group::Test), values(Group::Control));
            let tt = ttest_ind(&test, &control);
            Comparison {
                metric: metric.to_string(),
                n_test: test.len(),
                n_control: control.len(),
                mean_test: mean(&test),
                mean_control: mean(&control),
                t: tt.t,
                p: tt.p,
            }
        })
        .collect()
}

pub fn write_comparison(path: &Path, table: &[Comparison]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in table {
        w.serialize(row)?;
    }
    w.flush()?;
    Ok(())
}

/// Metrics and comparison for the configured band.
pub fn run(cfg: &StudyConfig) -> Result<(Vec<MetricsRow>, Vec<Comparison>)> {
    let band_dir = cfg.paths.connectome_dir.join(&cfg.metrics.band);
    info!("computing graph metrics from {}", band_dir.display());
    let rows = collect_metrics(&band_dir, &cfg.metrics)?;

    let demographics = Demographics::load(&cfg.paths.demographics)?;
    let unmatched = rows.iter().filter(|r| !demographics.rows.contains_key(&r.id)).count();
    if unmatched > 0 {
        warn!("{unmatched} subject(s) without demographics");
    }
    write_metrics_table(&cfg.paths.metrics_csv, &rows, &demographics)?;
    info!("{} row(s) saved to {}", rows.len(), cfg.paths.metrics_csv.display());

    let table = compare_groups(&rows);
    for c in &table {
        info!(
            "{:<10} test {:.4} (n={}) vs control {:.4} (n={}): t = {:.3}, p = {:.4}",
            c.metric, c.mean_test, c.n_test, c.mean_control, c.n_control, c.t, c.p
        );
    }
    write_comparison(&cfg.paths.comparison_csv, &table)?;
    Ok((rows, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn row(id: &str, ihs: f64) -> MetricsRow {
        let id = SubjectId::parse(id).unwrap();
        MetricsRow { group: id.group(), id, ihs, ge: 0.5, modularity: f64::NAN }
    }

    #[test]
    fn degenerate_matrices_are_rejected() {
        assert!(check_connectome(&Array2::zeros((3, 4)), 3).is_err());
        assert!(check_connectome(&Array2::from_elem((3, 3), f64::NAN), 3).is_err());
        assert!(check_connectome(&Array2::zeros((3, 3)), 19).is_err());
        assert!(check_connectome(&Array2::zeros((19, 19)), 19).is_ok());
    }

    #[test]
    fn comparison_ignores_nan_metrics() {
        let rows = vec![row("T1", 1.0), row("T2", 3.0), row("C1", 2.0), row("C2", 4.0), row("C3", f64::NAN)];
        let table = compare_groups(&rows);
        let ihs = &table[0];
        assert_eq!((ihs.n_test, ihs.n_control), (2, 2));
        assert_abs_diff_eq!(ihs.mean_test, 2.0);
        assert_abs_diff_eq!(ihs.mean_control, 3.0);
        assert!(ihs.t < 0.0);
        // Zero variance in ge, no values at all in modularity.
        assert!(table[1].t.is_nan());
        assert_eq!(table[2].n_test, 0);
        assert!(table[2].mean_test.is_nan());
    }

    #[test]
    fn demographics_concatenate_and_join_on_normalised_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("test.csv");
        let b = dir.path().join("control.csv");
        std::fs::write(&a, "id,age,sex\nT-001,7,F\n").unwrap();
        std::fs::write(&b, "id,age,site\nC-001,9,north\nC-001,10,south\n").unwrap();
        let dem = Demographics::load(&[a, b]).unwrap();
        assert_eq!(dem.columns, ["age", "sex", "site"]);
        assert_eq!(dem.len(), 2);
        assert_eq!(dem.fields(&SubjectId::parse("T001").unwrap()), ["7", "F", ""]);
        assert_eq!(dem.fields(&SubjectId::parse("C001").unwrap()), ["9", "", "north"]);
        assert_eq!(dem.fields(&SubjectId::parse("X9").unwrap()), ["", "", ""]);

        let out = dir.path().join("out/metrics.csv");
        write_metrics_table(&out, &[row("T001", 1.5)], &dem).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, "id,group,ihs,ge,modularity,age,sex,site\nT001,test,1.5,0.5,NaN,7,F,\n");
    }
}
