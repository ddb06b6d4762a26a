//! Per-subject batch execution.
//!
//! Cleanup and connectivity map one fallible job over a list of subjects.
//! A failing subject is logged and counted; its siblings keep running.
use std::fmt::Display;

use anyhow::Result;
use log::{error, info};
use rayon::prelude::*;

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// Item label and error message.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record<T: Display>(&mut self, label: T, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.succeeded.push(label.to_string()),
            Err(e) => self.failed.push((label.to_string(), format!("{e:#}"))),
        }
    }

    /// Log a one-line summary plus every failure.
    pub fn log_summary(&self, what: &str) {
        info!("{what}: {} ok, {} failed", self.succeeded.len(), self.failed.len());
        for (label, err) in &self.failed {
            error!("{what} {label}: {err}");
        }
    }
}

fn run_one<T: Display + Sync, F>(item: &T, f: &F) -> Result<()>
where
    F: Fn(&T) -> Result<()> + Sync,
{
    let outcome = f(item);
    match &outcome {
        Ok(()) => info!("{item}: done"),
        Err(e) => error!("{item}: {e:#}"),
    }
    outcome
}

/// Run `f` on every item, in parallel on a pool of `workers` threads
/// (`None` = one per core). The report lists items in input order.
pub fn run_parallel<T, F>(items: &[T], workers: Option<usize>, f: F) -> Result<BatchReport>
where
    T: Display + Sync,
    F: Fn(&T) -> Result<()> + Sync,
{
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = workers {
        builder = builder.num_threads(n.max(1));
    }
    let pool = builder.build()?;
    let outcomes: Vec<Result<()>> =
        pool.install(|| items.par_iter().map(|item| run_one(item, &f)).collect());

    let mut report = BatchReport::default();
    for (item, outcome) in items.iter().zip(outcomes) {
        report.record(item, outcome);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn failure_does_not_stop_siblings() {
        let items: Vec<u32> = (0..10).collect();
        let report = run_parallel(&items, Some(3), |&i| {
            if i % 4 == 1 {
                bail!("odd one out");
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(report.total(), 10);
        assert_eq!(report.failed.len(), 3);
        assert_eq!(report.failed[0], ("1".to_string(), "odd one out".to_string()));
        assert_eq!(report.succeeded[..3], ["0".to_string(), "2".to_string(), "3".to_string()]);
        assert!(!report.is_clean());
    }
}
