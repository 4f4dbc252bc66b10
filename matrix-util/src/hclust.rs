//! Agglomerative hierarchical clustering over a precomputed dissimilarity
//!
//! Average-linkage merging with a deterministic tie-break: when several
//! pairs attain the minimal distance, the first one in ascending (i, j)
//! scan order is merged. The merge history forms a dendrogram that can be
//! cut into any number of groups.

use fnv::FnvHashMap as HashMap;
use nalgebra::DMatrix;

/// One merge step. `left`/`right` are node ids: leaves are `0..n`, the
/// node created by merge `t` is `n + t`.
#[derive(Debug, Clone, Copy)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f32,
}

/// Merge history of an agglomerative clustering over `n_leaves` items
#[derive(Debug, Clone)]
pub struct Dendrogram {
    n_leaves: usize,
    merges: Vec<Merge>,
}

/// Build a dendrogram by average-linkage agglomeration.
///
/// * `dissim` - square symmetric dissimilarity matrix (items x items)
pub fn average_linkage(dissim: &DMatrix<f32>) -> anyhow::Result<Dendrogram> {
    let nn = dissim.nrows();
    if nn == 0 {
        anyhow::bail!("hierarchical clustering: empty dissimilarity matrix");
    }
    if dissim.ncols() != nn {
        anyhow::bail!(
            "hierarchical clustering: dissimilarity matrix must be square, got {} x {}",
            nn,
            dissim.ncols()
        );
    }

    // Working copy indexed by slot; slot j is retired once merged into i < j
    let mut dist: Vec<Vec<f32>> = (0..nn)
        .map(|i| (0..nn).map(|j| dissim[(i, j)]).collect())
        .collect();
    let mut active = vec![true; nn];
    let mut sizes = vec![1usize; nn];
    let mut node_of_slot: Vec<usize> = (0..nn).collect();

    let mut merges = Vec::with_capacity(nn.saturating_sub(1));

    for step in 0..nn.saturating_sub(1) {
        // First strict minimum in ascending (i, j) order
        let mut min_d = f32::MAX;
        let mut min_i = 0;
        let mut min_j = 0;
        for i in 0..nn {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..nn {
                if !active[j] {
                    continue;
                }
                if dist[i][j] < min_d {
                    min_d = dist[i][j];
                    min_i = i;
                    min_j = j;
                }
            }
        }

        merges.push(Merge {
            left: node_of_slot[min_i],
            right: node_of_slot[min_j],
            height: min_d,
        });

        let n_i = sizes[min_i] as f32;
        let n_j = sizes[min_j] as f32;

        // Average linkage: size-weighted mean of the two cluster distances
        for k in 0..nn {
            if !active[k] || k == min_i || k == min_j {
                continue;
            }
            let d = (n_i * dist[min_i][k] + n_j * dist[min_j][k]) / (n_i + n_j);
            dist[min_i][k] = d;
            dist[k][min_i] = d;
        }

        active[min_j] = false;
        sizes[min_i] += sizes[min_j];
        node_of_slot[min_i] = nn + step;
    }

    Ok(Dendrogram {
        n_leaves: nn,
        merges,
    })
}

impl Dendrogram {
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Merge heights in merge order
    pub fn heights(&self) -> Vec<f32> {
        self.merges.iter().map(|m| m.height).collect()
    }

    /// Leaves in dendrogram order (left subtree before right subtree)
    pub fn leaf_order(&self) -> Vec<usize> {
        let nn = self.n_leaves;
        if self.merges.is_empty() {
            return (0..nn).collect();
        }

        let mut order = Vec::with_capacity(nn);
        let root = nn + self.merges.len() - 1;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node < nn {
                order.push(node);
            } else {
                let merge = &self.merges[node - nn];
                // Right pushed first so the left subtree is emitted first
                stack.push(merge.right);
                stack.push(merge.left);
            }
        }
        order
    }

    /// Cut the dendrogram into exactly `k` groups.
    ///
    /// Returns one label per leaf, contiguous `0..k`, numbered by first
    /// appearance along the dendrogram leaf order. Every group is non-empty.
    pub fn cut(&self, k: usize) -> anyhow::Result<Vec<usize>> {
        let nn = self.n_leaves;
        if k == 0 || k > nn {
            anyhow::bail!(
                "dendrogram cut: cannot produce {} groups from {} leaves",
                k,
                nn
            );
        }

        // Apply the first n - k merges; remaining roots are the groups
        let n_merges = nn - k;
        let mut root_of: Vec<usize> = (0..nn + n_merges).collect();
        for (t, merge) in self.merges.iter().take(n_merges).enumerate() {
            root_of[merge.left] = nn + t;
            root_of[merge.right] = nn + t;
        }

        let find = |mut node: usize| {
            while root_of[node] != node {
                node = root_of[node];
            }
            node
        };

        // Number groups by first appearance in leaf order
        let mut label_of_root: HashMap<usize, usize> = HashMap::default();
        let mut labels = vec![0usize; nn];
        for leaf in self.leaf_order() {
            let root = find(leaf);
            let next = label_of_root.len();
            let label = *label_of_root.entry(root).or_insert(next);
            labels[leaf] = label;
        }

        debug_assert_eq!(label_of_root.len(), k);
        Ok(labels)
    }
}
