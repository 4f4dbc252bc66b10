//! Seeded k-means clustering for matrices
//!
//! Multi-start Lloyd iterations with k-means++ initialization. Every random
//! draw comes from a caller-supplied seed so that repeated runs with the
//! same arguments reproduce identical label assignments.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Arguments for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansArgs {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum number of Lloyd iterations per restart
    pub max_iter: usize,
    /// Number of random restarts; the best inertia wins
    pub n_restarts: usize,
    /// Base random seed; restart `r` uses `seed + r`
    pub seed: u64,
}

impl Default for KmeansArgs {
    fn default() -> Self {
        Self {
            num_clusters: 1,
            max_iter: 100,
            n_restarts: 1,
            seed: 0,
        }
    }
}

impl KmeansArgs {
    /// Create args with specified number of clusters
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }
}

/// Trait for k-means clustering on matrices
pub trait Kmeans {
    /// Cluster rows and return membership vector (one label per row)
    fn kmeans_rows(&self, args: &KmeansArgs) -> anyhow::Result<Vec<usize>>;
}

impl Kmeans for DMatrix<f32> {
    fn kmeans_rows(&self, args: &KmeansArgs) -> anyhow::Result<Vec<usize>> {
        let points: Vec<Vec<f32>> = self
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        kmeans(&points, args)
    }
}

/// Run multi-start k-means over a set of points
pub fn kmeans(points: &[Vec<f32>], args: &KmeansArgs) -> anyhow::Result<Vec<usize>> {
    let nn = points.len();
    let kk = args.num_clusters;

    if nn == 0 {
        anyhow::bail!("k-means: empty input");
    }
    if kk > nn {
        anyhow::bail!("k-means: {} clusters requested for {} points", kk, nn);
    }
    if kk <= 1 {
        return Ok(vec![0; nn]);
    }
    if args.n_restarts == 0 {
        anyhow::bail!("k-means: need at least one restart");
    }

    let mut best: Option<(Vec<usize>, f32)> = None;

    for restart in 0..args.n_restarts {
        let mut rng = StdRng::seed_from_u64(args.seed + restart as u64);
        let (labels, inertia) = lloyd(points, kk, args.max_iter, &mut rng);
        if best.as_ref().map(|(_, prev)| inertia < *prev).unwrap_or(true) {
            best = Some((labels, inertia));
        }
    }

    Ok(best.map(|(labels, _)| labels).unwrap_or_default())
}

/// One seeded Lloyd run; returns (labels, inertia)
fn lloyd(points: &[Vec<f32>], kk: usize, max_iter: usize, rng: &mut StdRng) -> (Vec<usize>, f32) {
    let nn = points.len();
    let dims = points[0].len();

    let mut centroids = plus_plus_init(points, kk, rng);
    let mut labels = vec![0usize; nn];

    for _iter in 0..max_iter {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = nearest_centroid(point, &centroids);
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }

        // Recompute centroids as cluster means
        let mut sums = vec![vec![0.0f32; dims]; kk];
        let mut counts = vec![0usize; kk];
        for (point, &c) in points.iter().zip(labels.iter()) {
            counts[c] += 1;
            for (s, &v) in sums[c].iter_mut().zip(point.iter()) {
                *s += v;
            }
        }
        for (c, sum) in sums.iter_mut().enumerate() {
            if counts[c] > 0 {
                for v in sum.iter_mut() {
                    *v /= counts[c] as f32;
                }
            } else {
                // Empty cluster: reseed from a random point
                let j = rng.random_range(0..nn);
                sum.copy_from_slice(&points[j]);
            }
        }
        centroids = sums;

        if !changed {
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(labels.iter())
        .map(|(p, &c)| sq_dist(p, &centroids[c]))
        .sum();

    (labels, inertia)
}

/// K-means++ initialization
fn plus_plus_init(points: &[Vec<f32>], kk: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let nn = points.len();
    let mut centroids = Vec::with_capacity(kk);
    centroids.push(points[rng.random_range(0..nn)].clone());

    let mut min_sq = vec![f32::MAX; nn];
    while centroids.len() < kk {
        let last = centroids.last().map(|c: &Vec<f32>| c.as_slice());
        for (i, point) in points.iter().enumerate() {
            if let Some(c) = last {
                min_sq[i] = min_sq[i].min(sq_dist(point, c));
            }
        }

        let total: f32 = min_sq.iter().sum();
        if total <= 0.0 {
            // Every point already sits on a centroid
            centroids.push(points[rng.random_range(0..nn)].clone());
            continue;
        }

        let threshold = rng.random::<f32>() * total;
        let mut cumsum = 0.0f32;
        let mut selected = nn - 1;
        for (i, &d) in min_sq.iter().enumerate() {
            cumsum += d;
            if cumsum >= threshold {
                selected = i;
                break;
            }
        }
        centroids.push(points[selected].clone());
    }

    centroids
}

fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_d = f32::MAX;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = sq_dist(point, centroid);
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}
