//! Consensus clustering of single-cell expression data
//!
//! Clusters the cells of a genes x cells expression matrix by combining
//! many independent k-means partitions, computed over multiple distance
//! metrics and low-dimensional projections, into a co-clustering consensus
//! matrix that is hierarchically clustered and cut into the final groups.
//! Past a configurable cell count the pipeline trains a linear SVM on a
//! clustered subset and predicts the remaining cells instead.
//!
//! The input matrix is expected to be already filtered and log-scaled;
//! loading, gene selection, k-range estimation and downstream marker
//! analysis belong to the surrounding application.

mod common;

pub mod config;
pub mod consensus;
pub mod distances;
pub mod ensemble;
pub mod hybrid;
pub mod pipeline;
pub mod projections;

pub use common::Mat;
pub use config::ClusterConfig;
pub use consensus::ConsensusResult;
pub use distances::Metric;
pub use ensemble::{ClusteringRun, GridKey};
pub use hybrid::TrainingSplit;
pub use pipeline::{run, HybridLabels, PipelineOutput};
pub use projections::{ProjectionKey, Transform};
