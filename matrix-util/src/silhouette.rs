//! Per-sample silhouette widths from a precomputed dissimilarity

use nalgebra::DMatrix;

/// Silhouette width for every sample given a dissimilarity matrix and a
/// cluster assignment (labels need not be contiguous).
///
/// `s(i) = (b(i) - a(i)) / max(a(i), b(i))` where `a` is the mean
/// within-cluster dissimilarity and `b` the smallest mean dissimilarity to
/// any other cluster. Singleton clusters score 0.
pub fn silhouette_widths(dissim: &DMatrix<f32>, labels: &[usize]) -> anyhow::Result<Vec<f32>> {
    let nn = dissim.nrows();
    if dissim.ncols() != nn {
        anyhow::bail!(
            "silhouette: dissimilarity matrix must be square, got {} x {}",
            nn,
            dissim.ncols()
        );
    }
    if labels.len() != nn {
        anyhow::bail!(
            "silhouette: {} labels for {} samples",
            labels.len(),
            nn
        );
    }
    if nn == 0 {
        return Ok(Vec::new());
    }

    let kk = labels.iter().max().copied().unwrap_or(0) + 1;
    if kk <= 1 {
        return Ok(vec![0.0; nn]);
    }

    let mut widths = vec![0.0f32; nn];
    for i in 0..nn {
        let label_i = labels[i];

        let mut sum_per_cluster = vec![0.0f32; kk];
        let mut count_per_cluster = vec![0usize; kk];
        for j in 0..nn {
            if i == j {
                continue;
            }
            sum_per_cluster[labels[j]] += dissim[(i, j)];
            count_per_cluster[labels[j]] += 1;
        }

        if count_per_cluster[label_i] == 0 {
            // Singleton cluster
            widths[i] = 0.0;
            continue;
        }

        let a = sum_per_cluster[label_i] / count_per_cluster[label_i] as f32;
        let b = (0..kk)
            .filter(|&c| c != label_i && count_per_cluster[c] > 0)
            .map(|c| sum_per_cluster[c] / count_per_cluster[c] as f32)
            .fold(f32::MAX, f32::min);

        if b == f32::MAX {
            // No other non-empty cluster exists
            widths[i] = 0.0;
            continue;
        }

        widths[i] = if a.max(b) > 0.0 { (b - a) / a.max(b) } else { 0.0 };
    }

    Ok(widths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_separation_scores_high() -> anyhow::Result<()> {
        // Two pairs: zero within, unit across
        let dissim = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 0.0, 1.0, 1.0, //
                0.0, 0.0, 1.0, 1.0, //
                1.0, 1.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, 0.0,
            ],
        );
        let widths = silhouette_widths(&dissim, &[0, 0, 1, 1])?;
        for w in widths {
            assert!((w - 1.0).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn single_cluster_scores_zero() -> anyhow::Result<()> {
        let dissim = DMatrix::from_element(3, 3, 0.5);
        let widths = silhouette_widths(&dissim, &[0, 0, 0])?;
        assert_eq!(widths, vec![0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn non_contiguous_single_cluster_scores_zero() -> anyhow::Result<()> {
        // Label 0 is unused, so only cluster 1 is populated
        let dissim = DMatrix::from_element(3, 3, 0.5);
        let widths = silhouette_widths(&dissim, &[1, 1, 1])?;
        assert_eq!(widths, vec![0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn singleton_cluster_scores_zero() -> anyhow::Result<()> {
        let dissim = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.0, 0.1, 0.9, //
                0.1, 0.0, 0.9, //
                0.9, 0.9, 0.0,
            ],
        );
        let widths = silhouette_widths(&dissim, &[0, 0, 1])?;
        assert_eq!(widths[2], 0.0);
        assert!(widths[0] > 0.5);
        Ok(())
    }

    #[test]
    fn label_length_mismatch_is_error() {
        let dissim = DMatrix::from_element(3, 3, 0.0);
        assert!(silhouette_widths(&dissim, &[0, 1]).is_err());
    }
}
