//! Brute-force cosine top-k over a dense embedding matrix
//!
//! Queries are normalised, multiplied against the (unit-norm) document matrix
//! in one product, and each score row goes through a partial selection so only
//! the `k` winners get sorted. Distances are derived from the selected
//! similarities afterwards, which keeps both framings in the same order.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

/// A selected document for one query row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Row index into the document matrix
    pub index: usize,

    /// Cosine similarity
    pub similarity: f32,
}

impl Neighbour {
    pub fn distance(&self) -> f32 {
        similarity_to_distance(self.similarity)
    }
}

/// Squared euclidean distance between unit vectors with cosine `similarity`
///
/// `|a - b|² = |a|² + |b|² - 2a·b = 2(1 - cos θ)`
pub fn similarity_to_distance(similarity: f32) -> f32 {
    2.0 * (1.0 - similarity)
}

/// L2 norm of a vector, accumulated in f64
pub fn l2_norm(vector: ArrayView1<f32>) -> f64 {
    vector
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt()
}

/// Scale every row to unit length; all-zero rows stay zero
pub fn normalize_rows(matrix: &mut Array2<f32>) {
    for mut row in matrix.rows_mut() {
        let norm = l2_norm(row.view()) as f32;
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

/// `queries · documentsᵀ`, shape `n_queries x n_documents`
pub fn similarity_matrix(queries: ArrayView2<f32>, documents: ArrayView2<f32>) -> Array2<f32> {
    queries.dot(&documents.t())
}

/// Best first; equal scores keep document order
fn rank_order(a: &Neighbour, b: &Neighbour) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.index.cmp(&b.index))
}

/// Indices of the `k` largest scores of one row, sorted best first.
///
/// `k` larger than the row is clamped to the row length.
pub fn top_k(scores: ArrayView1<f32>, k: usize) -> Vec<Neighbour> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Neighbour> = scores
        .iter()
        .enumerate()
        .map(|(index, &similarity)| Neighbour { index, similarity })
        .collect();

    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, rank_order);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(rank_order);

    candidates
}

/// Top-k neighbours of every query row against unit-norm `documents`
pub fn search_matrix(
    queries: ArrayView2<f32>,
    documents: ArrayView2<f32>,
    k: usize,
) -> Vec<Vec<Neighbour>> {
    let mut queries = queries.to_owned();
    normalize_rows(&mut queries);

    let scores = similarity_matrix(queries.view(), documents);
    scores
        .axis_iter(Axis(0))
        .map(|row| top_k(row, k))
        .collect()
}
