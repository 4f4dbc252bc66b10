//! Consensus builder
//!
//! For each candidate k, aggregates every successful clustering run built
//! with that k into a co-clustering consensus matrix, hierarchically
//! clusters its complement and cuts the dendrogram into exactly k groups.
//! Given a fixed ensemble this stage is fully deterministic; dendrogram
//! ties are broken by the first minimal pair in scan order.

use crate::common::*;
use crate::ensemble::{ClusteringRun, EnsembleOutput};
use matrix_util::hclust::{average_linkage, Dendrogram};
use matrix_util::silhouette::silhouette_widths;
use rayon::prelude::*;

/// Consensus outcome for one candidate cluster count
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    pub k: usize,
    /// Co-clustering frequency, cells x cells, entries in [0,1], diagonal 1
    pub consensus: Mat,
    pub dendrogram: Dendrogram,
    /// Final assignment, one id in `1..=k` per cell; ids are numbered by
    /// first appearance along the dendrogram leaf order and carry no
    /// meaning across different k or different runs
    pub labels: Vec<usize>,
    /// Per-cell silhouette width against the consensus dissimilarity
    pub silhouette: Vec<f32>,
    /// Cell indices per final group, in dendrogram-leaf order;
    /// `groups[g]` holds the cells labelled `g + 1`
    pub groups: Vec<Vec<usize>>,
    /// Number of ensemble runs aggregated
    pub n_runs: usize,
}

impl ConsensusResult {
    /// Cells per final group, ordered by group id
    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(|g| g.len()).collect()
    }

    /// Group size histogram as ASCII, largest group first
    pub fn histogram_ascii(&self, max_width: usize) -> String {
        let mut ranked: Vec<(usize, usize)> = self
            .group_sizes()
            .into_iter()
            .enumerate()
            .map(|(g, size)| (g + 1, size))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let n_cells = self.labels.len();
        let max_size = ranked.first().map(|&(_, s)| s).unwrap_or(1);

        let mut lines = vec![format!(
            "Consensus assignment for k = {} ({} cells, {} runs):",
            self.k, n_cells, self.n_runs
        )];
        for (group, size) in ranked {
            let pct = 100.0 * size as f64 / n_cells as f64;
            let bar_len = ((size as f64 / max_size as f64) * max_width as f64) as usize;
            let bar = "█".repeat(bar_len.max(1));
            lines.push(format!(
                "  Group {:3}  {:>6} cells ({:>5.1}%)  {}",
                group, size, pct, bar
            ));
        }
        lines.join("\n")
    }
}

/// Reconcile the ensemble into one `ConsensusResult` per candidate k.
///
/// Candidate k values with no surviving run are skipped with a warning;
/// the k order of the output follows `cluster_range`.
pub fn build_consensus(
    ensemble: &EnsembleOutput,
    cluster_range: &[usize],
    n_cells: usize,
) -> anyhow::Result<Vec<ConsensusResult>> {
    if ensemble.runs.is_empty() {
        anyhow::bail!(
            "consensus builder: no successful clustering runs; run the ensemble first"
        );
    }

    let with_runs: Vec<usize> = cluster_range
        .iter()
        .copied()
        .filter(|&k| {
            let present = !ensemble.runs_for_k(k).is_empty();
            if !present {
                warn!("no surviving runs for k = {}; skipping", k);
            }
            present
        })
        .collect();

    with_runs
        .par_iter()
        .map(|&k| consensus_for_k(&ensemble.runs_for_k(k), k, n_cells))
        .collect()
}

fn consensus_for_k(
    runs: &[&ClusteringRun],
    k: usize,
    n_cells: usize,
) -> anyhow::Result<ConsensusResult> {
    let consensus = consensus_matrix(runs, n_cells)?;

    // Dissimilarity: cells that always co-cluster sit at distance 0
    let dissim = consensus.map(|c| 1.0 - c);

    let dendrogram = average_linkage(&dissim)?;
    let cut = dendrogram.cut(k)?;
    let silhouette = silhouette_widths(&dissim, &cut)?;

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
    for cell in dendrogram.leaf_order() {
        groups[cut[cell]].push(cell);
    }

    let labels: Vec<usize> = cut.iter().map(|&l| l + 1).collect();

    info!(
        "consensus k = {}: {} runs, group sizes {:?}",
        k,
        runs.len(),
        groups.iter().map(|g| g.len()).collect::<Vec<_>>()
    );

    Ok(ConsensusResult {
        k,
        consensus,
        dendrogram,
        labels,
        silhouette,
        groups,
        n_runs: runs.len(),
    })
}

/// Fraction of runs placing each cell pair in the same cluster.
/// Symmetric with unit diagonal by construction.
pub fn consensus_matrix(runs: &[&ClusteringRun], n_cells: usize) -> anyhow::Result<Mat> {
    if runs.is_empty() {
        anyhow::bail!("consensus matrix needs at least one clustering run");
    }
    for run in runs {
        if run.labels.len() != n_cells {
            anyhow::bail!(
                "clustering run {} has {} labels for {} cells",
                run.key,
                run.labels.len(),
                n_cells
            );
        }
    }

    let weight = 1.0 / runs.len() as f32;
    let mut consensus = Mat::zeros(n_cells, n_cells);
    for run in runs {
        for i in 0..n_cells {
            for j in (i + 1)..n_cells {
                if run.labels[i] == run.labels[j] {
                    consensus[(i, j)] += weight;
                    consensus[(j, i)] += weight;
                }
            }
        }
    }
    for i in 0..n_cells {
        consensus[(i, i)] = 1.0;
    }
    Ok(consensus)
}
