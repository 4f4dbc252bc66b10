pub mod clustering;
pub mod dmatrix_util;
pub mod hclust;
pub mod silhouette;
pub mod traits;
