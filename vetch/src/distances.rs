//! Distance engine
//!
//! Pairwise cell-to-cell distance matrices under several metrics. Each
//! metric is computed independently; a degenerate input breaks only its own
//! metric and surfaces as a missing entry, never aborting siblings.

use crate::common::*;
use matrix_util::dmatrix_util::average_ranks;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distance metric between cells (columns of the dataset)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Metric {
    Euclidean,
    Pearson,
    Spearman,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Euclidean, Metric::Pearson, Metric::Spearman];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Euclidean => write!(f, "euclidean"),
            Metric::Pearson => write!(f, "pearson"),
            Metric::Spearman => write!(f, "spearman"),
        }
    }
}

/// Per-metric distance matrices with isolated failures
#[derive(Debug, Clone, Default)]
pub struct DistanceSet {
    pub matrices: BTreeMap<Metric, Mat>,
    pub failures: BTreeMap<Metric, String>,
}

impl DistanceSet {
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }
}

/// Compute one distance matrix per metric over the columns of
/// `data` (genes x cells). Metrics run in parallel and fail independently.
pub fn compute_distances(data: &Mat, metrics: &[Metric]) -> DistanceSet {
    let results: Vec<(Metric, anyhow::Result<Mat>)> = metrics
        .par_iter()
        .map(|&metric| (metric, pairwise_distances(data, metric)))
        .collect();

    let mut set = DistanceSet::default();
    for (metric, result) in results {
        match result {
            Ok(mat) => {
                set.matrices.insert(metric, mat);
            }
            Err(err) => {
                warn!("{} distance failed: {}", metric, err);
                set.failures.insert(metric, err.to_string());
            }
        }
    }
    info!(
        "distance engine: {} of {} metrics computed",
        set.matrices.len(),
        metrics.len()
    );
    set
}

/// Full pairwise cell distance matrix under one metric.
///
/// The result is symmetric with zero diagonal and non-negative entries.
pub fn pairwise_distances(data: &Mat, metric: Metric) -> anyhow::Result<Mat> {
    let n_cells = data.ncols();
    if n_cells < 2 {
        anyhow::bail!("{} distance needs at least 2 cells, got {}", metric, n_cells);
    }

    match metric {
        Metric::Euclidean => Ok(euclidean(data)),
        Metric::Pearson => correlation_distance(data, metric),
        Metric::Spearman => {
            let mut ranked = data.clone();
            for mut col in ranked.column_iter_mut() {
                let values: Vec<f32> = col.iter().copied().collect();
                let ranks = average_ranks(&values);
                for (v, r) in col.iter_mut().zip(ranks) {
                    *v = r;
                }
            }
            correlation_distance(&ranked, metric)
        }
    }
}

fn euclidean(data: &Mat) -> Mat {
    let nn = data.ncols();
    let rows: Vec<Vec<f32>> = (0..nn)
        .into_par_iter()
        .map(|i| {
            let x_i = data.column(i);
            (0..nn)
                .map(|j| if i == j { 0.0 } else { (x_i - data.column(j)).norm() })
                .collect()
        })
        .collect();

    from_rows(nn, rows)
}

/// `1 - cor(x_i, x_j)` over centred, unit-norm cell columns
fn correlation_distance(data: &Mat, metric: Metric) -> anyhow::Result<Mat> {
    let nn = data.ncols();
    let n_genes = data.nrows();

    let mut zz = Mat::zeros(n_genes, nn);
    for j in 0..nn {
        let col = data.column(j);
        let mean = col.mean();
        let centred = col.map(|v| v - mean);
        let norm = centred.norm();
        if norm <= f32::EPSILON {
            anyhow::bail!(
                "{} correlation undefined: cell {} has zero variance",
                metric,
                j
            );
        }
        zz.set_column(j, &(centred / norm));
    }

    let rows: Vec<Vec<f32>> = (0..nn)
        .into_par_iter()
        .map(|i| {
            let z_i = zz.column(i);
            (0..nn)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        (1.0 - z_i.dot(&zz.column(j))).max(0.0)
                    }
                })
                .collect()
        })
        .collect();

    Ok(from_rows(nn, rows))
}

fn from_rows(nn: usize, rows: Vec<Vec<f32>>) -> Mat {
    let mut mat = Mat::zeros(nn, nn);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            mat[(i, j)] = v;
        }
    }
    mat
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_util::dmatrix_util::rnorm;

    fn check_distance_axioms(dd: &Mat) {
        let nn = dd.nrows();
        for i in 0..nn {
            assert_eq!(dd[(i, i)], 0.0);
            for j in 0..nn {
                assert!(dd[(i, j)] >= 0.0);
                assert_eq!(dd[(i, j)], dd[(j, i)]);
            }
        }
    }

    #[test]
    fn all_metrics_satisfy_distance_axioms() -> anyhow::Result<()> {
        let data = rnorm(20, 10);
        for metric in Metric::ALL {
            let dd = pairwise_distances(&data, metric)?;
            assert_eq!(dd.nrows(), 10);
            check_distance_axioms(&dd);
        }
        Ok(())
    }

    #[test]
    fn euclidean_matches_direct_computation() -> anyhow::Result<()> {
        let data = Mat::from_column_slice(2, 3, &[0.0, 0.0, 3.0, 4.0, 0.0, 1.0]);
        let dd = pairwise_distances(&data, Metric::Euclidean)?;
        assert_abs_diff_eq!(dd[(0, 1)], 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(dd[(0, 2)], 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn pearson_of_identical_cells_is_zero() -> anyhow::Result<()> {
        let col = [1.0f32, 2.0, 3.0, 4.0];
        let mut data = Mat::zeros(4, 2);
        for i in 0..4 {
            data[(i, 0)] = col[i];
            data[(i, 1)] = col[i] * 2.0 + 1.0; // perfectly correlated
        }
        let dd = pairwise_distances(&data, Metric::Pearson)?;
        assert_abs_diff_eq!(dd[(0, 1)], 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn spearman_ignores_monotone_transform() -> anyhow::Result<()> {
        let mut data = Mat::zeros(5, 2);
        for i in 0..5 {
            let v = (i + 1) as f32;
            data[(i, 0)] = v;
            data[(i, 1)] = v * v * v; // monotone, rank-identical
        }
        let dd = pairwise_distances(&data, Metric::Spearman)?;
        assert_abs_diff_eq!(dd[(0, 1)], 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn constant_cell_breaks_only_correlation_metrics() {
        let mut data = rnorm(10, 5);
        data.set_column(2, &DVec::from_element(10, 1.0));

        let set = compute_distances(&data, &Metric::ALL);
        assert!(set.matrices.contains_key(&Metric::Euclidean));
        assert!(set.failures.contains_key(&Metric::Pearson));
        assert!(set.failures.contains_key(&Metric::Spearman));

        let msg = &set.failures[&Metric::Pearson];
        assert!(msg.contains("zero variance"), "unhelpful message: {}", msg);
    }
}
