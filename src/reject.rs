//! Global peak-to-peak rejection thresholds and epoch dropping.
//!
//! Threshold selection follows autoreject's `get_rejection_threshold`: for a
//! candidate threshold τ, the "clean" estimate is the mean of training epochs
//! whose largest channel peak-to-peak is at most τ; it is scored against the
//! median of the held-out epochs with −RMSE under K-fold cross-validation.
//! Every distinct per-epoch peak-to-peak value is a candidate, evaluated
//! exhaustively (autoreject samples the same candidate set with Bayesian
//! optimisation).
//!
//! Dropping follows `epochs.drop_bad(reject=...)`: an epoch is bad when any
//! channel of a thresholded type exceeds its threshold.
use ndarray::{s, Array2, Array3, ArrayView3, Axis};

use crate::raw::{ChannelType, Info};

/// Peak-to-peak amplitude per epoch and channel: `[E, C, T]` → `[E, C]`.
pub fn peak_to_peak(epochs: ArrayView3<f64>) -> Array2<f64> {
    let (n_e, n_c, _) = epochs.dim();
    Array2::from_shape_fn((n_e, n_c), |(e, c)| {
        let row = epochs.slice(s![e, c, ..]);
        let (lo, hi) = row
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi >= lo { hi - lo } else { 0.0 }
    })
}

/// K-fold split without shuffling (scikit-learn `KFold`): the first
/// `n % k` folds get one extra sample.
fn kfold(n: usize, k: usize) -> Vec<std::ops::Range<usize>> {
    let k = k.clamp(1, n.max(1));
    let mut out = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = n / k + usize::from(i < n % k);
        out.push(start..start + size);
        start += size;
    }
    out
}

fn median_epoch(epochs: &Array3<f64>, idx: &[usize]) -> Array2<f64> {
    let (_, n_c, n_t) = epochs.dim();
    let mut buf = Vec::with_capacity(idx.len());
    Array2::from_shape_fn((n_c, n_t), |(c, t)| {
        buf.clear();
        buf.extend(idx.iter().map(|&e| epochs[[e, c, t]]));
        buf.sort_by(f64::total_cmp);
        let m = buf.len();
        if m % 2 == 1 { buf[m / 2] } else { 0.5 * (buf[m / 2 - 1] + buf[m / 2]) }
    })
}

/// Select a single global threshold for `epochs` (`[E, C, T]`, one channel
/// type). Returns `None` when there are fewer than two epochs.
pub fn global_threshold(epochs: &Array3<f64>, cv: usize) -> Option<f64> {
    let n_e = epochs.shape()[0];
    if n_e < 2 {
        return None;
    }
    let ptp_max: Vec<f64> = peak_to_peak(epochs.view())
        .map_axis(Axis(1), |r| r.iter().copied().fold(0.0, f64::max))
        .to_vec();

    let mut candidates = ptp_max.clone();
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    let (_, n_c, n_t) = epochs.dim();
    let mut total = vec![0.0; candidates.len()];
    let mut folds_used = 0usize;

    for fold in kfold(n_e, cv) {
        let val: Vec<usize> = fold.clone().collect();
        let mut train: Vec<usize> = (0..n_e).filter(|e| !fold.contains(e)).collect();
        if val.is_empty() || train.is_empty() {
            continue;
        }
        folds_used += 1;
        let target = median_epoch(epochs, &val);
        train.sort_by(|&a, &b| ptp_max[a].total_cmp(&ptp_max[b]));

        // Candidates ascend, so the accepted training set only grows.
        let mut sum = Array2::<f64>::zeros((n_c, n_t));
        let mut n_kept = 0usize;
        let mut next = 0usize;
        for (ci, &tau) in candidates.iter().enumerate() {
            while next < train.len() && ptp_max[train[next]] <= tau {
                sum += &epochs.slice(s![train[next], .., ..]);
                n_kept += 1;
                next += 1;
            }
            if n_kept == 0 {
                total[ci] = f64::NEG_INFINITY;
                continue;
            }
            let inv = 1.0 / n_kept as f64;
            let mse = sum
                .iter()
                .zip(target.iter())
                .map(|(&s, &m)| {
                    let d = s * inv - m;
                    d * d
                })
                .sum::<f64>()
                / (n_c * n_t) as f64;
            total[ci] -= mse.sqrt();
        }
    }
    if folds_used == 0 {
        return None;
    }

    // First maximum, i.e. the smallest threshold among equally good ones.
    let mut best = 0;
    for (i, &score) in total.iter().enumerate() {
        if score > total[best] {
            best = i;
        }
    }
    total[best].is_finite().then(|| candidates[best])
}

/// Per-type thresholds for the good channels of each type in `kinds`.
pub fn rejection_thresholds(
    epochs: &Array3<f64>,
    info: &Info,
    kinds: &[ChannelType],
    cv: usize,
) -> Vec<(ChannelType, f64)> {
    kinds
        .iter()
        .filter_map(|&kind| {
            let picks = info.picks(kind, true);
            if picks.is_empty() {
                return None;
            }
            let sub = epochs.select(Axis(1), &picks);
            global_threshold(&sub, cv).map(|t| (kind, t))
        })
        .collect()
}

/// Outcome of [`drop_bad`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropLog {
    pub n_epochs: usize,
    /// Indices of epochs that passed.
    pub kept: Vec<usize>,
    /// Per dropped epoch: its index and the offending channels.
    pub dropped: Vec<(usize, Vec<String>)>,
}

impl DropLog {
    /// Percentage of dropped epochs.
    pub fn drop_percentage(&self) -> f64 {
        if self.n_epochs == 0 {
            return 0.0;
        }
        100.0 * self.dropped.len() as f64 / self.n_epochs as f64
    }
}

/// Mark epochs where a good channel of a thresholded type has a
/// peak-to-peak amplitude above its threshold.
pub fn drop_bad(epochs: &Array3<f64>, info: &Info, thresholds: &[(ChannelType, f64)]) -> DropLog {
    let ptp = peak_to_peak(epochs.view());
    let n_e = epochs.shape()[0];
    let mut log = DropLog { n_epochs: n_e, ..DropLog::default() };
    for e in 0..n_e {
        let mut offenders = Vec::new();
        for &(kind, tau) in thresholds {
            for c in info.picks(kind, true) {
                if ptp[[e, c]] > tau {
                    offenders.push(info.channels[c].name.clone());
                }
            }
        }
        if offenders.is_empty() {
            log.kept.push(e);
        } else {
            log.dropped.push((e, offenders));
        }
    }
    log
}

/// Channels named in at least `fraction` of all epochs' drop entries.
pub fn bad_channels_from_drop_log(log: &DropLog, info: &Info, fraction: f64) -> Vec<String> {
    if log.n_epochs == 0 {
        return Vec::new();
    }
    info.channels
        .iter()
        .filter(|ch| {
            let hits = log
                .dropped
                .iter()
                .filter(|(_, names)| names.iter().any(|n| n == &ch.name))
                .count();
            hits as f64 >= fraction * log.n_epochs as f64
        })
        .map(|ch| ch.name.clone())
        .collect()
}
