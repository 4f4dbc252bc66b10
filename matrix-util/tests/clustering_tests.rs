use matrix_util::clustering::{Kmeans, KmeansArgs};
use matrix_util::hclust::average_linkage;
use matrix_util::silhouette::silhouette_widths;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const N_PER_GROUP: usize = 40;
const N_GROUPS: usize = 3;

/// 3 well-separated Gaussian blobs of 40 points each in 2D
fn three_blobs(seed: u64) -> DMatrix<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, 0.1).unwrap();
    let centers: [[f32; 2]; 3] = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];

    let mut data = DMatrix::zeros(N_PER_GROUP * N_GROUPS, 2);
    for (g, center) in centers.iter().enumerate() {
        for i in 0..N_PER_GROUP {
            let row = g * N_PER_GROUP + i;
            for (d, &c) in center.iter().enumerate() {
                data[(row, d)] = c + noise.sample(&mut rng);
            }
        }
    }
    data
}

#[test]
fn kmeans_recovers_three_blobs() -> anyhow::Result<()> {
    let data = three_blobs(1);
    let args = KmeansArgs {
        num_clusters: 3,
        n_restarts: 10,
        seed: 11,
        ..Default::default()
    };
    let labels = data.kmeans_rows(&args)?;

    for g in 0..N_GROUPS {
        let start = g * N_PER_GROUP;
        let first = labels[start];
        assert!(
            labels[start..start + N_PER_GROUP].iter().all(|&l| l == first),
            "blob {} was split",
            g
        );
    }
    Ok(())
}

#[test]
fn kmeans_is_reproducible_across_runs() -> anyhow::Result<()> {
    let data = three_blobs(2);
    let args = KmeansArgs {
        num_clusters: 3,
        n_restarts: 7,
        seed: 99,
        ..Default::default()
    };
    assert_eq!(data.kmeans_rows(&args)?, data.kmeans_rows(&args)?);
    Ok(())
}

#[test]
fn hclust_cut_matches_blob_structure() -> anyhow::Result<()> {
    let data = three_blobs(3);
    let nn = data.nrows();

    // Euclidean dissimilarity over rows
    let mut dissim = DMatrix::zeros(nn, nn);
    for i in 0..nn {
        for j in (i + 1)..nn {
            let d = (data.row(i) - data.row(j)).norm();
            dissim[(i, j)] = d;
            dissim[(j, i)] = d;
        }
    }

    let dendro = average_linkage(&dissim)?;
    let labels = dendro.cut(3)?;

    for g in 0..N_GROUPS {
        let start = g * N_PER_GROUP;
        let first = labels[start];
        assert!(labels[start..start + N_PER_GROUP].iter().all(|&l| l == first));
    }

    // Well-separated blobs should score near-perfect silhouettes
    let widths = silhouette_widths(&dissim, &labels)?;
    let mean: f32 = widths.iter().sum::<f32>() / widths.len() as f32;
    assert!(mean > 0.9, "mean silhouette {} too low", mean);
    Ok(())
}
