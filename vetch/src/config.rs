//! Pipeline configuration
//!
//! One explicit configuration value threaded through every stage; nothing
//! is read from process-wide state except the optional core-count probe.

use crate::common::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Configuration for the consensus clustering pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Candidate cluster counts (each >= 2)
    pub cluster_range: Vec<usize>,

    /// Candidate projection dimensionalities. `None` derives a range from
    /// the cell count (4% to 7% of cells, clamped to >= 2, subsampled to at
    /// most `MAX_CANDIDATE_DIMS` values under the pipeline seed).
    pub dim_range: Option<Vec<usize>>,

    /// K-means restarts per grid cell. `None` adapts to the cell count:
    /// 50 restarts for small datasets, capped at 10 past 2000 cells.
    pub n_restarts: Option<usize>,

    /// Iteration cap for one k-means restart
    pub max_iter: usize,

    /// Seed for every random draw in the pipeline
    pub seed: u64,

    /// Worker pool size. `None` probes available cores and reserves one.
    pub num_threads: Option<usize>,

    /// Cell count above which the hybrid train/predict regime activates
    pub hybrid_threshold: usize,

    /// Hybrid regime: draw a random training set of this many cells.
    /// Mutually exclusive with `svm_train_indices`.
    pub svm_num_cells: Option<usize>,

    /// Hybrid regime: explicit training cell indices.
    /// Mutually exclusive with `svm_num_cells`.
    pub svm_train_indices: Option<Vec<usize>>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_range: vec![3, 4, 5],
            dim_range: None,
            n_restarts: None,
            max_iter: DEFAULT_KMEANS_MAX_ITER,
            seed: 42,
            num_threads: None,
            hybrid_threshold: DEFAULT_HYBRID_THRESHOLD,
            svm_num_cells: None,
            svm_train_indices: None,
        }
    }
}

impl ClusterConfig {
    /// Check parameters that do not depend on the dataset shape
    pub fn validate(&self, n_cells: usize) -> anyhow::Result<()> {
        if n_cells < 2 {
            anyhow::bail!("pipeline needs at least 2 cells, got {}", n_cells);
        }
        if self.cluster_range.is_empty() {
            anyhow::bail!("cluster_range is empty: supply at least one candidate k");
        }
        for &k in &self.cluster_range {
            if k < 2 {
                anyhow::bail!("cluster_range contains k = {}; every k must be >= 2", k);
            }
            if k >= n_cells {
                anyhow::bail!(
                    "cluster_range contains k = {} but only {} cells are available",
                    k,
                    n_cells
                );
            }
        }
        if let Some(dims) = &self.dim_range {
            if dims.is_empty() {
                anyhow::bail!("dim_range is empty: supply at least one dimensionality");
            }
            for &d in dims {
                if d == 0 {
                    anyhow::bail!("dim_range contains d = 0; dimensionalities must be >= 1");
                }
                if d > n_cells {
                    anyhow::bail!(
                        "dim_range contains d = {} but projections have only {} columns",
                        d,
                        n_cells
                    );
                }
            }
        }
        if self.max_iter == 0 {
            anyhow::bail!("max_iter must be >= 1");
        }
        Ok(())
    }

    /// Candidate dimensionalities for `n_cells` cells.
    ///
    /// The derived range spans 4% to 7% of the cell count; when it holds
    /// more than `MAX_CANDIDATE_DIMS` values it is subsampled with the
    /// pipeline seed so the choice reproduces across runs.
    pub fn candidate_dims(&self, n_cells: usize) -> Vec<usize> {
        if let Some(dims) = &self.dim_range {
            return dims.clone();
        }

        let lo = ((n_cells as f64 * 0.04).floor() as usize).max(2);
        let hi = ((n_cells as f64 * 0.07).ceil() as usize).max(lo);
        let mut dims: Vec<usize> = (lo..=hi).collect();

        if dims.len() > MAX_CANDIDATE_DIMS {
            let mut rng = StdRng::seed_from_u64(self.seed);
            dims.shuffle(&mut rng);
            dims.truncate(MAX_CANDIDATE_DIMS);
            dims.sort();
        }
        dims
    }

    /// Restarts per grid cell, adapted to the dataset size
    pub fn restarts_for(&self, n_cells: usize) -> usize {
        if let Some(r) = self.n_restarts {
            return r.max(1);
        }
        if n_cells > LARGE_DATASET_CELLS {
            CAPPED_KMEANS_RESTARTS
        } else {
            DEFAULT_KMEANS_RESTARTS
        }
    }

    /// Worker pool size for a stage with `n_tasks` independent units.
    ///
    /// Defaults to available cores minus one (reserving one for interactive
    /// use), capped to the task count so idle workers are never spawned.
    pub fn thread_budget(&self, n_tasks: usize) -> anyhow::Result<usize> {
        let budget = match self.num_threads {
            Some(0) => anyhow::bail!("num_threads must be >= 1"),
            Some(t) => t,
            None => {
                let detected = num_cpus::get();
                if detected == 0 {
                    anyhow::bail!(
                        "could not detect available cores; set num_threads explicitly"
                    );
                }
                (detected - 1).max(1)
            }
        };
        Ok(budget.min(n_tasks.max(1)))
    }
}
