//! Independent component analysis for artifact removal.
//!
//! Matches `mne.preprocessing.ICA(method='fastica')` on EEG channels:
//!
//! ```text
//! X  = (data − μ) / σ_eeg                 pre-whitening (one σ for the type)
//! X  = Vᵀ · X                             PCA, V sorted by variance λ
//! Z  = X[:k] / √λ[:k]                     whitened first k components
//! W  = FastICA(Z)                         parallel, logcosh, symmetric decorrelation
//! unmixing = W · diag(1/√λ[:k]),  mixing = unmixing⁻¹
//! ```
//!
//! [`Ica::apply`] back-projects with excluded components zeroed; PCA
//! components beyond `k` are passed through unchanged.
//!
//! Artifact components are found by correlating band-passed sources with an
//! EOG (1–10 Hz) or ECG (8–16 Hz) reference and flagging |z|-score outliers.
use anyhow::{anyhow, ensure, Result};
use log::{debug, warn};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::config::CleanConfig;
use crate::filter::{apply_fir_zero_phase, design_bandpass};
use crate::raw::{ChannelType, Raw};

/// Relative eigenvalue floor used to estimate the data rank.
const RANK_TOL: f64 = 1e-10;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no {0} channel to correlate ICA sources with")]
    MissingChannel(ChannelType),
    #[error("sampling rate {sfreq} Hz too low for a {h_freq} Hz reference band")]
    BandAboveNyquist { sfreq: f64, h_freq: f64 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// FastICA settings.
#[derive(Debug, Clone)]
pub struct IcaConfig {
    pub n_components: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self { n_components: 20, max_iter: 1000, tol: 1e-4, random_state: 97 }
    }
}

impl From<&CleanConfig> for IcaConfig {
    fn from(c: &CleanConfig) -> Self {
        Self {
            n_components: c.n_components,
            max_iter: c.max_iter,
            tol: c.tol,
            random_state: c.random_state,
        }
    }
}

/// A fitted decomposition.
#[derive(Debug, Clone)]
pub struct Ica {
    /// Channels the decomposition was fitted on, in row order.
    pub ch_names: Vec<String>,
    pre_whitener: f64,
    pca_mean: Array1<f64>,
    /// `[n_ch, n_ch]`, one principal axis per row.
    pca_components: Array2<f64>,
    pub pca_explained_variance: Array1<f64>,
    /// `[k, k]`
    pub unmixing: Array2<f64>,
    /// `[k, k]`
    pub mixing: Array2<f64>,
    pub n_iter: usize,
    pub converged: bool,
}

// ── Linear algebra helpers ───────────────────────────────────────────────────

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Eigen-decomposition of a symmetric matrix, eigenvalues descending,
/// eigenvectors as rows.
fn eigh_desc(a: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let eig = SymmetricEigen::new(to_dmatrix(a));
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));
    let values = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let n = a.nrows();
    let vectors = Array2::from_shape_fn((order.len(), n), |(r, c)| eig.eigenvectors[(c, order[r])]);
    (values, vectors)
}

/// `W ← (W Wᵀ)^{-1/2} W`
fn sym_decorrelation(w: &Array2<f64>) -> Array2<f64> {
    let eig = SymmetricEigen::new(to_dmatrix(&w.dot(&w.t())));
    let inv_sqrt = DMatrix::from_diagonal(&eig.eigenvalues.map(|s| 1.0 / s.max(f64::MIN_POSITIVE).sqrt()));
    let u = &eig.eigenvectors;
    from_dmatrix(&(u * inv_sqrt * u.transpose())).dot(w)
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Parallel FastICA with the logcosh contrast on whitened `z` (`[k, T]`).
/// Returns `(W, iterations, converged)`.
fn fastica(z: &Array2<f64>, cfg: &IcaConfig) -> (Array2<f64>, usize, bool) {
    let k = z.nrows();
    let n = z.ncols() as f64;
    let mut rng = StdRng::seed_from_u64(cfg.random_state);
    let w_init = Array2::from_shape_simple_fn((k, k), || standard_normal(&mut rng));
    let mut w = sym_decorrelation(&w_init);

    for it in 1..=cfg.max_iter {
        let gwx = w.dot(z).mapv_into(f64::tanh);
        let g_prime = gwx.map_axis(Axis(1), |r| r.iter().map(|g| 1.0 - g * g).sum::<f64>() / n);
        let mut w1 = gwx.dot(&z.t()) / n;
        for i in 0..k {
            for j in 0..k {
                w1[[i, j]] -= g_prime[i] * w[[i, j]];
            }
        }
        let w1 = sym_decorrelation(&w1);
        let lim = (0..k)
            .map(|i| ((w1.row(i).dot(&w.row(i))).abs() - 1.0).abs())
            .fold(0.0, f64::max);
        w = w1;
        if lim < cfg.tol {
            return (w, it, true);
        }
    }
    (w, cfg.max_iter, false)
}

// ── Decomposition ─────────────────────────────────────────────────────────────

impl Ica {
    /// Fit on the good EEG channels of `raw`.
    pub fn fit(raw: &Raw, cfg: &IcaConfig) -> Result<Self> {
        let picks = raw.info.picks(ChannelType::Eeg, true);
        ensure!(picks.len() >= 2, "ICA needs at least 2 good EEG channels, got {}", picks.len());
        ensure!(raw.n_times() > picks.len(), "ICA needs more samples than channels");
        let ch_names: Vec<String> = picks.iter().map(|&i| raw.info.channels[i].name.clone()).collect();

        let mut x = raw.get_data(&picks);
        let pre_whitener = x.std(0.0);
        ensure!(pre_whitener > 0.0, "EEG data is flat, cannot fit ICA");
        x /= pre_whitener;
        let pca_mean = x.mean_axis(Axis(1)).ok_or_else(|| anyhow!("empty data"))?;
        for (mut row, &m) in x.rows_mut().into_iter().zip(pca_mean.iter()) {
            row -= m;
        }

        let n_t = x.ncols() as f64;
        let cov = x.dot(&x.t()) / (n_t - 1.0);
        let (variance, pca_components) = eigh_desc(&cov);
        let top = variance.first().copied().unwrap_or(0.0);
        let rank = variance.iter().filter(|&&v| v > top * RANK_TOL).count();
        let k = cfg.n_components.min(rank);
        if k < cfg.n_components {
            debug!("ICA: capping {} requested components at data rank {rank}", cfg.n_components);
        }
        ensure!(k >= 1, "EEG data has rank 0");

        let scale: Vec<f64> = variance[..k].iter().map(|v| v.sqrt()).collect();
        let mut z = pca_components.slice(ndarray::s![..k, ..]).dot(&x);
        for (mut row, &s) in z.rows_mut().into_iter().zip(scale.iter()) {
            row /= s;
        }

        let (w, n_iter, converged) = fastica(&z, cfg);
        if !converged {
            warn!("FastICA did not converge in {n_iter} iterations (tol {})", cfg.tol);
        }
        let unmixing = Array2::from_shape_fn((k, k), |(i, j)| w[[i, j]] / scale[j]);
        let u = to_dmatrix(&unmixing);
        let mixing = match u.clone().try_inverse() {
            Some(m) => m,
            None => u.pseudo_inverse(1e-12).map_err(|e| anyhow!("unmixing pseudo-inverse: {e}"))?,
        };

        Ok(Self {
            ch_names,
            pre_whitener,
            pca_mean,
            pca_components,
            pca_explained_variance: Array1::from(variance),
            unmixing,
            mixing: from_dmatrix(&mixing),
            n_iter,
            converged,
        })
    }

    pub fn n_components(&self) -> usize {
        self.unmixing.nrows()
    }

    fn fitted_picks(&self, raw: &Raw) -> Result<Vec<usize>> {
        self.ch_names
            .iter()
            .map(|n| raw.info.index_of(n).ok_or_else(|| anyhow!("channel {n} used by ICA is missing")))
            .collect()
    }

    /// Centred, pre-whitened PCA scores of `raw` (`[n_ch, T]`).
    fn pca_scores(&self, raw: &Raw, picks: &[usize]) -> Array2<f64> {
        let mut x = raw.get_data(picks) / self.pre_whitener;
        for (mut row, &m) in x.rows_mut().into_iter().zip(self.pca_mean.iter()) {
            row -= m;
        }
        self.pca_components.dot(&x)
    }

    /// Component time courses, `[k, T]`.
    pub fn sources(&self, raw: &Raw) -> Result<Array2<f64>> {
        let picks = self.fitted_picks(raw)?;
        let k = self.n_components();
        let scores = self.pca_scores(raw, &picks);
        Ok(self.unmixing.dot(&scores.slice(ndarray::s![..k, ..])))
    }

    /// Remove components `exclude` from the fitted channels of `raw`.
    pub fn apply(&self, raw: &mut Raw, exclude: &[usize]) -> Result<()> {
        let picks = self.fitted_picks(raw)?;
        let k = self.n_components();
        let n = self.pca_components.nrows();
        let keep: Vec<usize> = (0..k).filter(|c| !exclude.contains(c)).collect();

        // Block [[A·Pk·W, 0], [0, I]] in PCA space.
        let mut m = Array2::<f64>::eye(n);
        let block = self.mixing.select(Axis(1), &keep).dot(&self.unmixing.select(Axis(0), &keep));
        m.slice_mut(ndarray::s![..k, ..k]).assign(&block);
        let proj = self.pca_components.t().dot(&m).dot(&self.pca_components);

        let mut x = raw.get_data(&picks) / self.pre_whitener;
        for (mut row, &mu) in x.rows_mut().into_iter().zip(self.pca_mean.iter()) {
            row -= mu;
        }
        let mut y = proj.dot(&x);
        for (mut row, &mu) in y.rows_mut().into_iter().zip(self.pca_mean.iter()) {
            row += mu;
        }
        y *= self.pre_whitener;
        for (r, &c) in picks.iter().enumerate() {
            raw.data.row_mut(c).assign(&y.row(r));
        }
        Ok(())
    }

    /// Components correlated with the EOG channels (1–10 Hz).
    pub fn find_bads_eog(&self, raw: &Raw, threshold: f64) -> Result<Vec<usize>, ArtifactError> {
        self.find_bads_reference(raw, ChannelType::Eog, 1.0, 10.0, threshold)
    }

    /// Components correlated with the ECG channel (8–16 Hz).
    ///
    /// This is MNE's `method='correlation'`. Its default `ctps` (phase
    /// statistics over R-peak epochs) is not implemented, so component
    /// picks can differ from an MNE run with default arguments.
    pub fn find_bads_ecg(&self, raw: &Raw, threshold: f64) -> Result<Vec<usize>, ArtifactError> {
        self.find_bads_reference(raw, ChannelType::Ecg, 8.0, 16.0, threshold)
    }

    fn find_bads_reference(
        &self,
        raw: &Raw,
        kind: ChannelType,
        l_freq: f64,
        h_freq: f64,
        threshold: f64,
    ) -> Result<Vec<usize>, ArtifactError> {
        let refs = raw.info.picks(kind, false);
        if refs.is_empty() {
            return Err(ArtifactError::MissingChannel(kind));
        }
        if h_freq >= raw.sfreq() / 2.0 {
            return Err(ArtifactError::BandAboveNyquist { sfreq: raw.sfreq(), h_freq });
        }
        let h = design_bandpass(l_freq, h_freq, raw.sfreq());
        let mut sources = self.sources(raw)?;
        apply_fir_zero_phase(&mut sources, &h)?;
        let mut targets = raw.get_data(&refs);
        apply_fir_zero_phase(&mut targets, &h)?;

        let mut bad = Vec::new();
        for (target, &ch) in targets.rows().into_iter().zip(refs.iter()) {
            let scores: Vec<f64> = sources.rows().into_iter().map(|s| pearson(s, target)).collect();
            let found = find_outliers(&scores, threshold, 2);
            debug!("{} {}: components {found:?} above |z| {threshold}", kind, raw.info.channels[ch].name);
            bad.extend(found);
        }
        bad.sort_unstable();
        bad.dedup();
        Ok(bad)
    }
}

fn pearson(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
    let n = a.len() as f64;
    let (ma, mb) = (a.sum() / n, b.sum() / n);
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (dx, dy) = (x - ma, y - mb);
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa > 0.0 && sbb > 0.0 { sab / (saa * sbb).sqrt() } else { 0.0 }
}

/// Iterative outlier detection on |z|-scores: each pass computes mean and
/// standard deviation over the not-yet-flagged entries. Indices ascending.
pub fn find_outliers(scores: &[f64], threshold: f64, max_iter: usize) -> Vec<usize> {
    let mut flagged = vec![false; scores.len()];
    for _ in 0..max_iter {
        let live: Vec<f64> = scores.iter().zip(&flagged).filter(|(_, f)| !**f).map(|(s, _)| *s).collect();
        if live.len() < 2 {
            break;
        }
        let mean = live.iter().sum::<f64>() / live.len() as f64;
        let sd = (live.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / live.len() as f64).sqrt();
        if sd == 0.0 {
            break;
        }
        let mut any = false;
        for (i, &s) in scores.iter().enumerate() {
            if !flagged[i] && ((s - mean) / sd).abs() > threshold {
                flagged[i] = true;
                any = true;
            }
        }
        if !any {
            break;
        }
    }
    flagged.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{Channel, Info};
    use std::f64::consts::PI;

    const SFREQ: f64 = 100.0;
    const N: usize = 6000;

    fn blink(t: f64) -> f64 {
        (0..30)
            .map(|k| {
                let c = 1.0 + 2.3 * k as f64 + 0.4 * (k as f64).sin();
                (-((t - c) / 0.1).powi(2)).exp()
            })
            .sum()
    }

    /// Blink plus sines at distinct frequencies, mixed into EEG channels,
    /// and an EOG channel carrying the blink.
    fn mixed_raw(n_eeg: usize) -> (Raw, Array2<f64>) {
        let freqs = [3.1, 5.3, 7.7, 11.3, 13.9, 17.3, 19.9, 23.7, 29.3, 31.1];
        let sources = Array2::from_shape_fn((n_eeg, N), |(s, i)| {
            let t = i as f64 / SFREQ;
            if s == 0 { blink(t) } else { (2.0 * PI * freqs[s - 1] * t + s as f64).sin() }
        });
        let mixing = Array2::from_shape_fn((n_eeg, n_eeg), |(i, j)| {
            if i == j { 1.0 } else { 0.3 * ((i * 8 + j) as f64).sin() }
        });
        let eeg = mixing.dot(&sources) * 1e-5;
        let mut channels: Vec<Channel> =
            (0..n_eeg).map(|i| Channel::new(format!("E{i}"), ChannelType::Eeg)).collect();
        channels.push(Channel::new("VEOG", ChannelType::Eog));
        let data = Array2::from_shape_fn((n_eeg + 1, N), |(c, i)| {
            if c < n_eeg {
                eeg[[c, i]]
            } else {
                1e-4 * (blink(i as f64 / SFREQ) + 0.01 * ((i * 7) as f64).sin())
            }
        });
        (Raw::new(data, Info::new(SFREQ, channels)).unwrap(), sources)
    }

    fn cfg(n: usize) -> IcaConfig {
        IcaConfig { n_components: n, ..IcaConfig::default() }
    }

    #[test]
    fn recovers_independent_sources() {
        let (raw, truth) = mixed_raw(4);
        let ica = Ica::fit(&raw, &cfg(4)).unwrap();
        assert!(ica.converged);
        let est = ica.sources(&raw).unwrap();
        for s in truth.rows() {
            let best = est.rows().into_iter().map(|e| pearson(e, s).abs()).fold(0.0, f64::max);
            assert!(best > 0.95, "source recovered with |r| = {best}");
        }
    }

    #[test]
    fn apply_without_exclusion_is_identity() {
        let (raw, _) = mixed_raw(4);
        let ica = Ica::fit(&raw, &cfg(3)).unwrap();
        let mut out = raw.clone();
        ica.apply(&mut out, &[]).unwrap();
        for (a, b) in out.data.iter().zip(raw.data.iter()) {
            approx::assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn eog_component_found_and_removed() {
        let (raw, truth) = mixed_raw(8);
        let ica = Ica::fit(&raw, &cfg(8)).unwrap();
        let est = ica.sources(&raw).unwrap();
        let blink_idx = (0..8)
            .max_by(|&a, &b| {
                let ra = pearson(est.row(a), truth.row(0)).abs();
                let rb = pearson(est.row(b), truth.row(0)).abs();
                ra.total_cmp(&rb)
            })
            .unwrap();
        let bads = ica.find_bads_eog(&raw, 2.0).unwrap();
        assert!(bads.contains(&blink_idx), "{bads:?} lacks {blink_idx}");

        let mut cleaned = raw.clone();
        ica.apply(&mut cleaned, &bads).unwrap();
        let eog = raw.data.row(8);
        for c in 0..8 {
            let after = pearson(cleaned.data.row(c), eog).abs();
            assert!(after < 0.1, "E{c}: |r| = {after} after cleaning");
        }
        // EOG row itself untouched.
        assert_eq!(cleaned.data.row(8), raw.data.row(8));
    }

    #[test]
    fn missing_ecg_is_reported() {
        let (raw, _) = mixed_raw(4);
        let ica = Ica::fit(&raw, &cfg(4)).unwrap();
        assert!(matches!(
            ica.find_bads_ecg(&raw, 3.0),
            Err(ArtifactError::MissingChannel(ChannelType::Ecg))
        ));
    }

    #[test]
    fn fit_is_deterministic() {
        let (raw, _) = mixed_raw(4);
        let a = Ica::fit(&raw, &cfg(4)).unwrap();
        let b = Ica::fit(&raw, &cfg(4)).unwrap();
        assert_eq!(a.unmixing, b.unmixing);
    }

    #[test]
    fn components_capped_at_rank() {
        let (mut raw, _) = mixed_raw(4);
        crate::reference::set_average_reference(&mut raw).unwrap();
        let ica = Ica::fit(&raw, &cfg(20)).unwrap();
        assert_eq!(ica.n_components(), 3);
    }

    #[test]
    fn outliers_iterate() {
        let mut scores = vec![0.0; 20];
        scores[3] = 1.0;
        scores[7] = 0.2;
        scores[11] = 0.01;
        assert_eq!(find_outliers(&scores, 3.0, 1), vec![3]);
        assert_eq!(find_outliers(&scores, 3.0, 2), vec![3, 7]);
        assert!(find_outliers(&[0.5; 5], 3.0, 2).is_empty());
    }
}
