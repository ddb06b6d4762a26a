//! Weighted-graph metrics on connectome matrices.
//!
//! Ports of the Brain Connectivity Toolbox routines used by the study
//! (`efficiency_wei`, `community_louvain`) plus interhemispheric strength.
use anyhow::{anyhow, ensure, Result};
use ndarray::Array2;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Global efficiency of a weighted undirected graph.
///
/// Edge lengths are `1/w` for positive weights; non-positive weights are
/// treated as absent. Returns the mean inverse shortest-path length over
/// ordered pairs `i ≠ j` (disconnected pairs contribute 0).
pub fn global_efficiency(w: &Array2<f64>) -> Result<f64> {
    let n = w.nrows();
    ensure!(w.ncols() == n, "matrix must be square, got {:?}", w.dim());
    ensure!(n >= 2, "global efficiency needs at least 2 nodes");
    ensure!(w.iter().all(|v| v.is_finite()), "matrix contains non-finite weights");

    let length = |i: usize, j: usize| {
        let v = w[[i, j]];
        if i != j && v > 0.0 { Some(1.0 / v) } else { None }
    };

    let mut total = 0.0;
    let mut dist = vec![f64::INFINITY; n];
    let mut done = vec![false; n];
    for src in 0..n {
        dist.iter_mut().for_each(|d| *d = f64::INFINITY);
        done.iter_mut().for_each(|d| *d = false);
        dist[src] = 0.0;
        // Dense Dijkstra, O(n²) per source.
        for _ in 0..n {
            let Some(u) = (0..n)
                .filter(|&v| !done[v] && dist[v].is_finite())
                .min_by(|&a, &b| dist[a].total_cmp(&dist[b]))
            else {
                break;
            };
            done[u] = true;
            for v in 0..n {
                if let Some(l) = length(u, v) {
                    if dist[u] + l < dist[v] {
                        dist[v] = dist[u] + l;
                    }
                }
            }
        }
        total += dist
            .iter()
            .enumerate()
            .filter(|&(j, d)| j != src && d.is_finite() && *d > 0.0)
            .map(|(_, d)| 1.0 / d)
            .sum::<f64>();
    }
    Ok(total / (n * n - n) as f64)
}

/// Modularity matrix for signed weights (`negative_sym` null model):
///
/// ```text
/// B = (B⁺ − B⁻) / (s⁺ + s⁻),   B± = W± − γ k±k±ᵀ / s±
/// ```
fn negative_sym_modularity(w: &Array2<f64>, gamma: f64) -> Result<Array2<f64>> {
    let n = w.nrows();
    let part = |sign: f64| {
        let wp = w.mapv(|v| if v * sign > 0.0 { v * sign } else { 0.0 });
        let s = wp.sum();
        let k_out = wp.sum_axis(ndarray::Axis(1));
        let k_in = wp.sum_axis(ndarray::Axis(0));
        let b = if s > 0.0 {
            Array2::from_shape_fn((n, n), |(i, j)| wp[[i, j]] - gamma * k_out[i] * k_in[j] / s)
        } else {
            Array2::zeros((n, n))
        };
        (b, s)
    };
    let (b0, s0) = part(1.0);
    let (b1, s1) = part(-1.0);
    ensure!(s0 + s1 > 0.0, "graph has no edges");
    let b = (b0 - b1) / (s0 + s1);
    Ok((&b + &b.t()) / 2.0)
}

/// Label each entry by the rank of its value among the distinct values.
fn unique_inverse(labels: &[usize]) -> Vec<usize> {
    let mut uniq = labels.to_vec();
    uniq.sort_unstable();
    uniq.dedup();
    labels
        .iter()
        .map(|l| uniq.binary_search(l).unwrap_or_default())
        .collect()
}

/// Louvain community detection with the `negative_sym` null model.
///
/// Returns zero-based community labels per node and the modularity `Q`.
/// `seed` fixes the node visiting order, so results are reproducible.
pub fn community_louvain(w: &Array2<f64>, gamma: f64, seed: u64) -> Result<(Vec<usize>, f64)> {
    let n0 = w.nrows();
    ensure!(w.ncols() == n0, "matrix must be square, got {:?}", w.dim());
    ensure!(w.iter().all(|v| v.is_finite()), "matrix contains non-finite weights");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut b = negative_sym_modularity(w, gamma)?;
    let mut n = n0;
    let mut ci: Vec<usize> = (0..n0).collect();
    let mut first = true;
    let mut q0 = f64::NEG_INFINITY;
    let mut q = b.diag().sum();

    while q - q0 > 1e-10 {
        // Node-to-module degree.
        let mut hnm = b.clone();
        let mut mb: Vec<usize> = (0..n).collect();
        let mut order: Vec<usize> = (0..n).collect();

        let mut it = 0;
        let mut moved = true;
        while moved {
            it += 1;
            if it > 1000 {
                return Err(anyhow!("Louvain local moving did not settle in 1000 passes"));
            }
            moved = false;
            order.shuffle(&mut rng);
            for &u in &order {
                let ma = mb[u];
                let (mut best, mut max_dq) = (ma, 0.0);
                for m in 0..n {
                    if m == ma {
                        continue;
                    }
                    let dq = hnm[[u, m]] - hnm[[u, ma]] + b[[u, u]];
                    if dq > max_dq {
                        max_dq = dq;
                        best = m;
                    }
                }
                if max_dq > 1e-10 {
                    moved = true;
                    for v in 0..n {
                        hnm[[v, best]] += b[[v, u]];
                        hnm[[v, ma]] -= b[[v, u]];
                    }
                    mb[u] = best;
                }
            }
        }

        let mb = unique_inverse(&mb);
        if first {
            ci = mb.clone();
            first = false;
        } else {
            ci.iter_mut().for_each(|c| *c = mb[*c]);
        }

        let k = mb.iter().max().map_or(0, |m| m + 1);
        let mut agg = Array2::<f64>::zeros((k, k));
        for u in 0..n {
            for v in 0..n {
                agg[[mb[u], mb[v]]] += b[[u, v]];
            }
        }
        b = agg;
        n = k;
        q0 = q;
        q = b.diag().sum();
    }
    Ok((ci, q))
}

/// Sum of `w[l, r]` over every left × right electrode pair. Names are
/// resolved to rows of `w` through `electrodes` (case-insensitive).
pub fn interhemispheric_strength(
    w: &Array2<f64>,
    electrodes: &[String],
    left: &[String],
    right: &[String],
) -> Result<f64> {
    ensure!(
        w.nrows() >= electrodes.len() && w.ncols() >= electrodes.len(),
        "matrix {:?} smaller than the {}-electrode layout",
        w.dim(),
        electrodes.len()
    );
    let index = |name: &String| {
        electrodes
            .iter()
            .position(|e| e.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("electrode {name} not in the matrix layout"))
    };
    let l_idx = left.iter().map(index).collect::<Result<Vec<_>>>()?;
    let r_idx = right.iter().map(index).collect::<Result<Vec<_>>>()?;
    Ok(l_idx.iter().flat_map(|&l| r_idx.iter().map(move |&r| (l, r))).map(|(l, r)| w[[l, r]]).sum())
}
