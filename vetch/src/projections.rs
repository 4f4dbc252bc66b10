//! Projection engine
//!
//! Turns each distance matrix into per-cell coordinates through two
//! independent eigendecompositions: a principal-component projection of the
//! distance matrix itself and a graph-Laplacian spectral embedding. Columns
//! are ordered by decreasing significance so downstream stages can take the
//! first `d` dimensions.

use crate::common::*;
use crate::distances::{DistanceSet, Metric};
use nalgebra::SymmetricEigen;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Projection method applied to a distance matrix
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Transform {
    /// Eigenvectors of the distance matrix, decreasing |eigenvalue|
    Pca,
    /// Eigenvectors of the normalized graph Laplacian, increasing eigenvalue
    Laplacian,
}

impl Transform {
    pub const ALL: [Transform; 2] = [Transform::Pca, Transform::Laplacian];
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Pca => write!(f, "pca"),
            Transform::Laplacian => write!(f, "laplacian"),
        }
    }
}

/// Typed key of one (metric, transform) combination
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProjectionKey {
    pub metric: Metric,
    pub transform: Transform,
}

impl std::fmt::Display for ProjectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.metric, self.transform)
    }
}

/// Per-combination projections (cells x eigen-dimensions) with isolated
/// failures
#[derive(Debug, Clone, Default)]
pub struct ProjectionSet {
    pub matrices: BTreeMap<ProjectionKey, Mat>,
    pub failures: BTreeMap<ProjectionKey, String>,
}

impl ProjectionSet {
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }
}

/// Project every available distance matrix under every transform.
/// Combinations depending on a failed metric are skipped; each remaining
/// combination is computed independently and fails in isolation.
pub fn compute_projections(distances: &DistanceSet, transforms: &[Transform]) -> ProjectionSet {
    let tasks: Vec<(ProjectionKey, &Mat)> = distances
        .matrices
        .iter()
        .flat_map(|(&metric, dist)| {
            transforms
                .iter()
                .map(move |&transform| (ProjectionKey { metric, transform }, dist))
        })
        .collect();

    let results: Vec<(ProjectionKey, anyhow::Result<Mat>)> = tasks
        .into_par_iter()
        .map(|(key, dist)| (key, project(dist, key.transform)))
        .collect();

    let mut set = ProjectionSet::default();
    for (key, result) in results {
        match result {
            Ok(mat) => {
                set.matrices.insert(key, mat);
            }
            Err(err) => {
                warn!("{} projection failed: {}", key, err);
                set.failures.insert(key, err.to_string());
            }
        }
    }
    info!("projection engine: {} combinations computed", set.matrices.len());
    set
}

/// One projection of a distance matrix; the full eigenbasis is retained
pub fn project(dist: &Mat, transform: Transform) -> anyhow::Result<Mat> {
    match transform {
        Transform::Pca => pca(dist),
        Transform::Laplacian => laplacian(dist),
    }
}

fn eigen(mat: Mat) -> anyhow::Result<SymmetricEigen<f32, nalgebra::Dyn>> {
    SymmetricEigen::try_new(mat, 1e-7, 0)
        .ok_or_else(|| anyhow::anyhow!("eigendecomposition did not converge"))
}

/// Eigenvectors of the distance matrix, ordered by decreasing |eigenvalue|
fn pca(dist: &Mat) -> anyhow::Result<Mat> {
    let decomp = eigen(dist.clone())?;

    let mut order: Vec<usize> = (0..decomp.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        decomp.eigenvalues[b]
            .abs()
            .partial_cmp(&decomp.eigenvalues[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(reorder_columns(&decomp.eigenvectors, &order))
}

/// Eigenvectors of `I - S^{-1/2} A S^{-1/2}` with `A = exp(-D / max(D))`,
/// ordered by increasing eigenvalue (smoothest modes first)
fn laplacian(dist: &Mat) -> anyhow::Result<Mat> {
    let nn = dist.nrows();
    let max_d = dist.max();
    if max_d <= 0.0 {
        anyhow::bail!("all pairwise distances are zero; Laplacian undefined");
    }

    let aa = dist.map(|d| (-d / max_d).exp());
    let inv_sqrt_rowsum: Vec<f32> = (0..nn)
        .map(|i| aa.row(i).sum().sqrt().recip())
        .collect();

    let mut ll = Mat::zeros(nn, nn);
    for i in 0..nn {
        for j in 0..nn {
            let norm_a = aa[(i, j)] * inv_sqrt_rowsum[i] * inv_sqrt_rowsum[j];
            ll[(i, j)] = if i == j { 1.0 - norm_a } else { -norm_a };
        }
    }

    let decomp = eigen(ll)?;

    let mut order: Vec<usize> = (0..decomp.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        decomp.eigenvalues[a]
            .partial_cmp(&decomp.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(reorder_columns(&decomp.eigenvectors, &order))
}

fn reorder_columns(mat: &Mat, order: &[usize]) -> Mat {
    let mut out = Mat::zeros(mat.nrows(), order.len());
    for (dst, &src) in order.iter().enumerate() {
        out.set_column(dst, &mat.column(src));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::pairwise_distances;
    use approx::assert_abs_diff_eq;
    use matrix_util::dmatrix_util::rnorm;

    #[test]
    fn projections_have_full_shape() -> anyhow::Result<()> {
        let data = rnorm(20, 12);
        let dist = pairwise_distances(&data, Metric::Euclidean)?;
        for transform in Transform::ALL {
            let proj = project(&dist, transform)?;
            assert_eq!(proj.nrows(), 12);
            assert_eq!(proj.ncols(), 12);
        }
        Ok(())
    }

    #[test]
    fn pca_columns_ordered_by_eigenvalue_magnitude() -> anyhow::Result<()> {
        let data = rnorm(15, 10);
        let dist = pairwise_distances(&data, Metric::Euclidean)?;
        let proj = pca(&dist)?;

        // Recover |eigenvalue| per column via the Rayleigh quotient
        let magnitudes: Vec<f32> = (0..proj.ncols())
            .map(|j| {
                let v = proj.column(j);
                (v.transpose() * &dist * v)[(0, 0)].abs()
            })
            .collect();
        for w in magnitudes.windows(2) {
            assert!(w[0] >= w[1] - 1e-4, "columns out of order: {:?}", magnitudes);
        }
        Ok(())
    }

    #[test]
    fn laplacian_smoothest_mode_is_near_zero() -> anyhow::Result<()> {
        let data = rnorm(15, 10);
        let dist = pairwise_distances(&data, Metric::Euclidean)?;

        let proj = laplacian(&dist)?;
        // The first eigenvalue of a normalized Laplacian is ~0; check the
        // Rayleigh quotient of the first returned column
        let max_d = dist.max();
        let aa = dist.map(|d| (-d / max_d).exp());
        let inv_sqrt: Vec<f32> = (0..10).map(|i| aa.row(i).sum().sqrt().recip()).collect();
        let mut ll = Mat::zeros(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                let norm_a = aa[(i, j)] * inv_sqrt[i] * inv_sqrt[j];
                ll[(i, j)] = if i == j { 1.0 - norm_a } else { -norm_a };
            }
        }
        let v0 = proj.column(0);
        let lambda0 = (v0.transpose() * &ll * v0)[(0, 0)];
        assert_abs_diff_eq!(lambda0, 0.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn failed_metric_skips_dependent_combinations() {
        use crate::distances::compute_distances;

        let mut data = rnorm(10, 6);
        data.set_column(1, &DVec::from_element(10, 2.0)); // constant cell

        let dists = compute_distances(&data, &Metric::ALL);
        let projections = compute_projections(&dists, &Transform::ALL);

        // Only the euclidean metric survives, so exactly 2 combinations
        assert_eq!(projections.matrices.len(), 2);
        for key in projections.matrices.keys() {
            assert_eq!(key.metric, Metric::Euclidean);
        }
    }
}
