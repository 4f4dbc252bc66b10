#![allow(dead_code)]

pub use log::{info, warn};

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;

/// Above this many cells the pipeline switches to the hybrid
/// train-then-predict regime unless the caller asked otherwise.
pub const DEFAULT_HYBRID_THRESHOLD: usize = 5000;

/// Smallest training set the hybrid regime accepts
pub const MIN_TRAINING_CELLS: usize = 10;

/// Default k-means restarts for small datasets
pub const DEFAULT_KMEANS_RESTARTS: usize = 50;

/// Restart cap once the dataset grows past `LARGE_DATASET_CELLS`
pub const CAPPED_KMEANS_RESTARTS: usize = 10;
pub const LARGE_DATASET_CELLS: usize = 2000;

/// Default iteration cap for one k-means restart
pub const DEFAULT_KMEANS_MAX_ITER: usize = 100;

/// At most this many candidate dimensionalities are kept; larger natural
/// ranges are subsampled down to this count.
pub const MAX_CANDIDATE_DIMS: usize = 15;
