use crate::traits::{MatOps, SampleOps};

pub use nalgebra::{DMatrix, DVector};
pub use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

type Mat = DMatrix<f32>;

impl MatOps for Mat {
    type Mat = Mat;
    type Scalar = f32;

    /// `Y[,j] = X[,j] / max(1, norm(X[,j]))`
    fn normalize_columns_inplace(&mut self) {
        for mut x_j in self.column_iter_mut() {
            let denom = x_j.norm().max(1.0);
            x_j /= denom;
        }
    }

    fn normalize_columns(&self) -> Mat {
        let mut ret = self.clone();
        ret.normalize_columns_inplace();
        ret
    }

    /// Column-wise z-score: subtract mean, divide by standard deviation.
    /// Columns with zero variance are only centred.
    fn scale_columns_inplace(&mut self) {
        let nn = self.nrows() as f32;
        for mut x_j in self.column_iter_mut() {
            let mean = x_j.mean();
            x_j.add_scalar_mut(-mean);
            let sd = (x_j.norm_squared() / nn.max(1.0)).sqrt();
            if sd > 0.0 {
                x_j /= sd;
            }
        }
    }

    fn scale_columns(&self) -> Mat {
        let mut ret = self.clone();
        ret.scale_columns_inplace();
        ret
    }

    fn centre_columns_inplace(&mut self) {
        for mut x_j in self.column_iter_mut() {
            let mean = x_j.mean();
            x_j.add_scalar_mut(-mean);
        }
    }

    fn centre_columns(&self) -> Mat {
        let mut ret = self.clone();
        ret.centre_columns_inplace();
        ret
    }
}

impl SampleOps for Mat {
    type Mat = Mat;
    type Scalar = f32;

    fn runif(dd: usize, nn: usize) -> Mat {
        runif(dd, nn)
    }

    fn rnorm(dd: usize, nn: usize) -> Mat {
        rnorm(dd, nn)
    }
}

/// Sample d,n matrix from U(0,1)
pub fn runif(dd: usize, nn: usize) -> Mat {
    let rvec = (0..(dd * nn))
        .into_par_iter()
        .map_init(rand::rng, |rng, _| rng.random::<f32>())
        .collect();

    Mat::from_vec(dd, nn, rvec)
}

/// Sample d,n matrix from N(0,1)
pub fn rnorm(dd: usize, nn: usize) -> Mat {
    let rvec = (0..(dd * nn))
        .into_par_iter()
        .map_init(rand::rng, |rng, _| StandardNormal.sample(rng))
        .collect();

    Mat::from_vec(dd, nn, rvec)
}

/// Average ranks of a slice, with ties sharing the mean of their rank range.
///
/// Ranks are 1-based, matching the usual statistical convention.
pub fn average_ranks(values: &[f32]) -> Vec<f32> {
    let nn = values.len();
    let mut order: Vec<usize> = (0..nn).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0f32; nn];
    let mut i = 0;
    while i < nn {
        let mut j = i;
        while j + 1 < nn && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j are tied; each gets the mean rank
        let mean_rank = ((i + j) as f32) / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = mean_rank;
        }
        i = j + 1;
    }
    ranks
}
