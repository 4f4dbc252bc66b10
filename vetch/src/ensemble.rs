//! Ensemble clusterer
//!
//! Runs k-means independently over the full cross-product of
//! (projection, cluster count, dimensionality). The workload is an
//! immutable task list dispatched to the worker pool; every task draws its
//! randomness from a seed substream derived from the task's position in
//! that list, so results depend on the grid itself, never on scheduling.

use crate::common::*;
use crate::config::ClusterConfig;
use crate::projections::{ProjectionKey, ProjectionSet};
use indicatif::ParallelProgressIterator;
use matrix_util::clustering::{kmeans, KmeansArgs};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Typed key of one grid cell
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GridKey {
    pub projection: ProjectionKey,
    pub k: usize,
    pub d: usize,
}

impl std::fmt::Display for GridKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} k={} d={}", self.projection, self.k, self.d)
    }
}

/// One successful k-means run. Label ids are consistent only within this
/// run; there is no identity across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringRun {
    pub key: GridKey,
    pub labels: Vec<usize>,
}

/// All grid results; failed slots are recorded, not propagated
#[derive(Debug, Clone, Default)]
pub struct EnsembleOutput {
    pub runs: Vec<ClusteringRun>,
    pub failures: Vec<(GridKey, String)>,
}

impl EnsembleOutput {
    /// Successful runs built for cluster count `k`, regardless of which
    /// projection or dimensionality produced them
    pub fn runs_for_k(&self, k: usize) -> Vec<&ClusteringRun> {
        self.runs.iter().filter(|r| r.key.k == k).collect()
    }
}

/// Run the full (projection x k x d) grid.
///
/// Reproducibility: task `t` of `n_restarts` restarts seeds its substream
/// at `seed + t * n_restarts`, so the same configuration yields
/// bit-identical label assignments under any worker count.
pub fn run_ensemble(
    projections: &ProjectionSet,
    config: &ClusterConfig,
    n_cells: usize,
) -> anyhow::Result<EnsembleOutput> {
    if projections.is_empty() {
        anyhow::bail!(
            "ensemble clusterer: no projections available; run the projection engine first"
        );
    }

    let dims = config.candidate_dims(n_cells);
    let restarts = config.restarts_for(n_cells);

    // Deterministic task order: projections in key order, then the caller's
    // k order, then the d order
    let mut tasks: Vec<(GridKey, &Mat)> = Vec::new();
    for (&projection, proj) in projections.matrices.iter() {
        for &k in &config.cluster_range {
            for &d in &dims {
                tasks.push((GridKey { projection, k, d }, proj));
            }
        }
    }

    info!(
        "ensemble clusterer: {} tasks ({} projections x {} k x {} d), {} restarts each",
        tasks.len(),
        projections.matrices.len(),
        config.cluster_range.len(),
        dims.len(),
        restarts
    );

    let n_tasks = tasks.len() as u64;
    let results: Vec<(GridKey, anyhow::Result<Vec<usize>>)> = tasks
        .into_par_iter()
        .enumerate()
        .progress_count(n_tasks)
        .map(|(index, (key, proj))| {
            let labels = cluster_one(proj, &key, index, restarts, config);
            (key, labels)
        })
        .collect();

    let mut out = EnsembleOutput::default();
    for (key, result) in results {
        match result {
            Ok(labels) => out.runs.push(ClusteringRun { key, labels }),
            Err(err) => {
                warn!("grid cell {} failed: {}", key, err);
                out.failures.push((key, err.to_string()));
            }
        }
    }

    info!(
        "ensemble clusterer: {} runs succeeded, {} failed",
        out.runs.len(),
        out.failures.len()
    );
    Ok(out)
}

fn cluster_one(
    proj: &Mat,
    key: &GridKey,
    task_index: usize,
    restarts: usize,
    config: &ClusterConfig,
) -> anyhow::Result<Vec<usize>> {
    if key.d > proj.ncols() {
        anyhow::bail!(
            "d = {} exceeds the {} available projection columns",
            key.d,
            proj.ncols()
        );
    }

    let features: Vec<Vec<f32>> = (0..proj.nrows())
        .map(|i| (0..key.d).map(|j| proj[(i, j)]).collect())
        .collect();

    let args = KmeansArgs {
        num_clusters: key.k,
        max_iter: config.max_iter,
        n_restarts: restarts,
        seed: config.seed + (task_index * restarts) as u64,
    };
    kmeans(&features, &args)
}
