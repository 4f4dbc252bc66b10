//! Scalability classifier (hybrid regime)
//!
//! For large datasets the ensemble stages run on a training subset only; a
//! linear-kernel SVM trained on the subset's consensus labels predicts the
//! remaining study cells. Predicted labels are classifier output and are
//! never validated by consensus or silhouette.

use crate::common::*;
use crate::config::ClusterConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Partition of cell indices into training and study sets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSplit {
    /// Cells the full ensemble pipeline runs on, ascending
    pub training: Vec<usize>,
    /// Cells labelled by the classifier, ascending
    pub study: Vec<usize>,
}

/// Decide whether the hybrid regime applies and build the training split.
///
/// Returns `Ok(None)` when the full pipeline should run on every cell. All
/// validation failures here are fatal and happen before any clustering.
pub fn resolve_split(
    config: &ClusterConfig,
    n_cells: usize,
) -> anyhow::Result<Option<TrainingSplit>> {
    let requested = config.svm_num_cells.is_some() || config.svm_train_indices.is_some();
    if !requested && n_cells <= config.hybrid_threshold {
        return Ok(None);
    }

    if config.svm_num_cells.is_some() && config.svm_train_indices.is_some() {
        anyhow::bail!(
            "supply either svm_num_cells or svm_train_indices, not both"
        );
    }

    let training: Vec<usize> = if let Some(indices) = &config.svm_train_indices {
        if indices.len() < MIN_TRAINING_CELLS {
            anyhow::bail!(
                "svm_train_indices holds {} cells; at least {} are required",
                indices.len(),
                MIN_TRAINING_CELLS
            );
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_cells) {
            anyhow::bail!(
                "svm_train_indices contains cell {} but only cells 0..{} exist",
                bad,
                n_cells
            );
        }
        let mut sorted = indices.clone();
        sorted.sort();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            anyhow::bail!("svm_train_indices contains duplicate cell indices");
        }
        sorted
    } else {
        let size = match config.svm_num_cells {
            Some(size) => {
                if size >= n_cells - 1 {
                    anyhow::bail!(
                        "svm training size {} must be strictly less than {} (total cells minus one)",
                        size,
                        n_cells - 1
                    );
                }
                size
            }
            // Auto-activation: train on up to the threshold, always
            // leaving at least two study cells
            None => config.hybrid_threshold.min(n_cells.saturating_sub(2)),
        };
        if size < MIN_TRAINING_CELLS {
            anyhow::bail!(
                "svm training size {} is below the minimum of {}",
                size,
                MIN_TRAINING_CELLS
            );
        }
        sample_training(n_cells, size, config.seed)
    };

    let in_training = {
        let mut mask = vec![false; n_cells];
        for &i in &training {
            mask[i] = true;
        }
        mask
    };
    let study: Vec<usize> = (0..n_cells).filter(|&i| !in_training[i]).collect();

    info!(
        "hybrid regime: {} training cells, {} study cells",
        training.len(),
        study.len()
    );
    Ok(Some(TrainingSplit { training, study }))
}

/// Seeded draw of `size` distinct training cells, ascending
fn sample_training(n_cells: usize, size: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, n_cells, size).into_vec();
    picked.sort();
    picked
}

/// One-vs-rest linear SVM trained by seeded Pegasos subgradient descent
#[derive(Debug, Clone)]
pub struct LinearSvm {
    classes: Vec<usize>,
    weights: Vec<DVec>,
    biases: Vec<f32>,
}

const PEGASOS_LAMBDA: f32 = 1e-3;
const PEGASOS_MIN_STEPS: usize = 2000;
const PEGASOS_STEPS_PER_CELL: usize = 20;

impl LinearSvm {
    /// Train on cell columns of `data` (genes x cells).
    ///
    /// * `samples` - column indices of the training cells
    /// * `labels` - one class id per training cell, aligned with `samples`
    pub fn train(
        data: &Mat,
        samples: &[usize],
        labels: &[usize],
        seed: u64,
    ) -> anyhow::Result<Self> {
        if samples.is_empty() {
            anyhow::bail!("svm training set is empty");
        }
        if samples.len() != labels.len() {
            anyhow::bail!(
                "svm: {} training cells but {} labels",
                samples.len(),
                labels.len()
            );
        }

        let mut classes: Vec<usize> = labels.to_vec();
        classes.sort();
        classes.dedup();
        if classes.len() < 2 {
            anyhow::bail!("svm needs at least 2 distinct classes, got {}", classes.len());
        }

        let n_genes = data.nrows();
        let nn = samples.len();
        let steps = (PEGASOS_STEPS_PER_CELL * nn).max(PEGASOS_MIN_STEPS);

        let mut weights = Vec::with_capacity(classes.len());
        let mut biases = Vec::with_capacity(classes.len());

        for (c_idx, &class) in classes.iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed + c_idx as u64);
            let mut w = DVec::zeros(n_genes);
            let mut b = 0.0f32;

            for t in 1..=steps {
                let pick = rng.random_range(0..nn);
                let x = data.column(samples[pick]);
                let y = if labels[pick] == class { 1.0f32 } else { -1.0 };

                let eta = 1.0 / (PEGASOS_LAMBDA * t as f32);
                let margin = y * (w.dot(&x) + b);

                w *= 1.0 - eta * PEGASOS_LAMBDA;
                if margin < 1.0 {
                    w.axpy(eta * y, &x.clone_owned(), 1.0);
                    b += eta * y;
                }
            }

            weights.push(w);
            biases.push(b);
        }

        Ok(Self {
            classes,
            weights,
            biases,
        })
    }

    /// Predict the class of one cell column
    pub fn predict_cell(&self, data: &Mat, cell: usize) -> usize {
        let x = data.column(cell);
        let mut best = self.classes[0];
        let mut best_score = f32::MIN;
        for (c_idx, &class) in self.classes.iter().enumerate() {
            let score = self.weights[c_idx].dot(&x) + self.biases[c_idx];
            if score > best_score {
                best_score = score;
                best = class;
            }
        }
        best
    }
}

/// Train on the split's training cells and merge consensus labels with
/// classifier predictions back into the original cell order.
///
/// * `train_labels` - consensus labels, aligned with `split.training`
pub fn train_and_predict(
    data: &Mat,
    split: &TrainingSplit,
    train_labels: &[usize],
    seed: u64,
) -> anyhow::Result<Vec<usize>> {
    let svm = LinearSvm::train(data, &split.training, train_labels, seed)?;

    let mut merged = vec![0usize; data.ncols()];
    for (&cell, &label) in split.training.iter().zip(train_labels.iter()) {
        merged[cell] = label;
    }
    for &cell in &split.study {
        merged[cell] = svm.predict_cell(data, cell);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(size: Option<usize>, indices: Option<Vec<usize>>) -> ClusterConfig {
        ClusterConfig {
            svm_num_cells: size,
            svm_train_indices: indices,
            ..Default::default()
        }
    }

    #[test]
    fn inactive_below_threshold() -> anyhow::Result<()> {
        let config = config_with(None, None);
        assert!(resolve_split(&config, 100)?.is_none());
        Ok(())
    }

    #[test]
    fn active_above_threshold() -> anyhow::Result<()> {
        let config = config_with(None, None);
        let split = resolve_split(&config, 6000)?.expect("hybrid should activate");
        assert_eq!(split.training.len() + split.study.len(), 6000);
        Ok(())
    }

    #[test]
    fn auto_activation_just_past_threshold() -> anyhow::Result<()> {
        // One cell over the threshold must not trip the size precondition
        let config = config_with(None, None);
        let n = config.hybrid_threshold + 1;
        let split = resolve_split(&config, n)?.expect("hybrid should activate");
        assert_eq!(split.training.len(), n - 2);
        assert_eq!(split.study.len(), 2);
        Ok(())
    }

    #[test]
    fn both_size_and_indices_is_fatal() {
        let config = config_with(Some(50), Some((0..50).collect()));
        let err = resolve_split(&config, 100).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn size_below_minimum_is_fatal() {
        let config = config_with(Some(5), None);
        let err = resolve_split(&config, 100).unwrap_err();
        assert!(err.to_string().contains("minimum"));
    }

    #[test]
    fn size_too_close_to_total_is_fatal() {
        let config = config_with(Some(99), None);
        assert!(resolve_split(&config, 100).is_err());
    }

    #[test]
    fn index_out_of_range_is_fatal() {
        let mut indices: Vec<usize> = (0..12).collect();
        indices.push(100);
        let config = config_with(None, Some(indices));
        let err = resolve_split(&config, 100).unwrap_err();
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn duplicate_indices_are_fatal() {
        let mut indices: Vec<usize> = (0..12).collect();
        indices.push(3);
        let config = config_with(None, Some(indices));
        assert!(resolve_split(&config, 100).is_err());
    }

    #[test]
    fn split_is_disjoint_and_reproducible() -> anyhow::Result<()> {
        let config = config_with(Some(30), None);
        let a = resolve_split(&config, 100)?.expect("requested");
        let b = resolve_split(&config, 100)?.expect("requested");

        assert_eq!(a.training, b.training);
        assert_eq!(a.training.len(), 30);
        assert_eq!(a.study.len(), 70);
        for &i in &a.training {
            assert!(!a.study.contains(&i));
        }
        Ok(())
    }

    #[test]
    fn svm_separates_two_blobs() -> anyhow::Result<()> {
        // 10 genes x 40 cells; first 20 cells high in genes 0..5,
        // last 20 high in genes 5..10
        let mut data = Mat::zeros(10, 40);
        for cell in 0..40 {
            let base = if cell < 20 { 0 } else { 5 };
            for g in 0..5 {
                data[(base + g, cell)] = 1.0 + 0.01 * (cell as f32);
            }
        }

        let training: Vec<usize> = (0..10).chain(20..30).collect();
        let labels: Vec<usize> = training.iter().map(|&c| if c < 20 { 1 } else { 2 }).collect();
        let study: Vec<usize> = (10..20).chain(30..40).collect();
        let split = TrainingSplit {
            training,
            study,
        };

        let merged = train_and_predict(&data, &split, &labels, 7)?;
        for cell in 0..40 {
            let expected = if cell < 20 { 1 } else { 2 };
            assert_eq!(merged[cell], expected, "cell {} mislabelled", cell);
        }
        Ok(())
    }

    #[test]
    fn svm_single_class_is_an_error() {
        let data = Mat::zeros(5, 20);
        let samples: Vec<usize> = (0..10).collect();
        let labels = vec![1usize; 10];
        assert!(LinearSvm::train(&data, &samples, &labels, 0).is_err());
    }
}
