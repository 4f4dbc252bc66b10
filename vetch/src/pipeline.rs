//! Pipeline orchestration
//!
//! Threads one explicit state value through the four numeric stages and,
//! when the hybrid regime applies, restricts them to the training subset
//! before handing the remainder to the classifier. Each stage is a pure
//! function of the prior state and the configuration; stages are separated
//! by a join, and a failed stage returns control with nothing mutated.

use crate::common::*;
use crate::config::ClusterConfig;
use crate::consensus::{build_consensus, ConsensusResult};
use crate::distances::{compute_distances, DistanceSet, Metric};
use crate::ensemble::{run_ensemble, EnsembleOutput};
use crate::hybrid::{resolve_split, train_and_predict, TrainingSplit};
use crate::projections::{compute_projections, ProjectionSet, Transform};

/// Full-length labeling produced by the classifier for one k.
/// Study-cell entries are classifier output, not ensemble output.
#[derive(Debug, Clone)]
pub struct HybridLabels {
    pub k: usize,
    /// One id in `1..=k` per cell, original cell order
    pub labels: Vec<usize>,
}

/// Everything the pipeline produced. In the hybrid regime the distance,
/// projection, ensemble and consensus fields describe the training subset
/// only; `hybrid_labels` covers every cell.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub distances: DistanceSet,
    pub projections: ProjectionSet,
    pub ensemble: EnsembleOutput,
    pub consensus: Vec<ConsensusResult>,
    pub split: Option<TrainingSplit>,
    pub hybrid_labels: Vec<HybridLabels>,
}

/// Run the consensus clustering pipeline on `data` (genes x cells).
pub fn run(data: &Mat, config: &ClusterConfig) -> anyhow::Result<PipelineOutput> {
    let n_cells = data.ncols();
    config.validate(n_cells)?;

    let split = resolve_split(config, n_cells)?;

    let n_clustered = split
        .as_ref()
        .map(|s| s.training.len())
        .unwrap_or(n_cells);
    if let Some(s) = &split {
        // The ensemble only sees the training cells
        config.validate(s.training.len())?;
    }

    let grid_tasks = Metric::ALL.len()
        * Transform::ALL.len()
        * config.cluster_range.len()
        * config.candidate_dims(n_clustered).len();
    let n_threads = config.thread_budget(grid_tasks)?;
    info!(
        "pipeline: {} cells ({} clustered), {} worker threads",
        n_cells, n_clustered, n_threads
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()?;

    pool.install(|| match &split {
        None => {
            let stages = run_stages(data, config)?;
            Ok(PipelineOutput {
                distances: stages.0,
                projections: stages.1,
                ensemble: stages.2,
                consensus: stages.3,
                split: None,
                hybrid_labels: Vec::new(),
            })
        }
        Some(split) => {
            let train_data = data.select_columns(split.training.iter());
            let stages = run_stages(&train_data, config)?;

            let mut hybrid_labels = Vec::with_capacity(stages.3.len());
            for result in &stages.3 {
                let labels =
                    train_and_predict(data, split, &result.labels, config.seed + result.k as u64)?;
                hybrid_labels.push(HybridLabels {
                    k: result.k,
                    labels,
                });
            }

            Ok(PipelineOutput {
                distances: stages.0,
                projections: stages.1,
                ensemble: stages.2,
                consensus: stages.3,
                split: Some(split.clone()),
                hybrid_labels,
            })
        }
    })
}

type Stages = (DistanceSet, ProjectionSet, EnsembleOutput, Vec<ConsensusResult>);

fn run_stages(data: &Mat, config: &ClusterConfig) -> anyhow::Result<Stages> {
    let n_cells = data.ncols();

    let distances = compute_distances(data, &Metric::ALL);
    if distances.is_empty() {
        let reasons: Vec<String> = distances
            .failures
            .iter()
            .map(|(m, e)| format!("{}: {}", m, e))
            .collect();
        anyhow::bail!("every distance metric failed ({})", reasons.join("; "));
    }

    let projections = compute_projections(&distances, &Transform::ALL);
    if projections.is_empty() {
        let reasons: Vec<String> = projections
            .failures
            .iter()
            .map(|(p, e)| format!("{}: {}", p, e))
            .collect();
        anyhow::bail!("every projection failed ({})", reasons.join("; "));
    }

    let ensemble = run_ensemble(&projections, config, n_cells)?;
    let consensus = build_consensus(&ensemble, &config.cluster_range, n_cells)?;

    Ok((distances, projections, ensemble, consensus))
}
