//! Vector search backends.
//!
//! Two interchangeable implementations of [`SearchBackend`]:
//!
//! - [`FlatIndex`] (feature `matrix`) — rows are L2-normalized into an
//!   `ndarray` matrix at build time and ranked by inner product.
//! - [`ScanIndex`] — vectors are kept as-is and ranked by cosine similarity
//!   computed row by row.
//!
//! On normalized vectors inner product equals cosine similarity, so the two
//! backends produce the same ranking; which one is active is purely a
//! performance concern. [`build_backend`] selects the matrix backend when it
//! is compiled in and falls back to the scan backend otherwise.

use std::collections::HashSet;

#[cfg(feature = "matrix")]
use ndarray::{Array1, Array2};
use tracing::debug;

/// A read-only nearest-neighbor index over a fixed set of vectors.
///
/// Positions returned by [`search`](SearchBackend::search) are insertion
/// positions into the vector set the backend was built from; the caller maps
/// them back to chunks. Ties in score break by insertion order.
pub trait SearchBackend: Send + Sync {
    /// Number of vectors in the index.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the `top_k` most similar positions with their scores, ordered
    /// by descending score.
    ///
    /// When `allowed` is given, only those positions participate in the
    /// search, as if the index had been built solely over that subset.
    /// Searching an empty index (or an empty subset) returns an empty list,
    /// as does a query whose dimension differs from the stored vectors.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        allowed: Option<&HashSet<usize>>,
    ) -> Vec<(usize, f32)>;

    /// Backend name, for logging.
    fn name(&self) -> &'static str;
}

/// Build the preferred backend available at compile time.
pub fn build_backend(vectors: Vec<Vec<f32>>) -> Box<dyn SearchBackend> {
    #[cfg(feature = "matrix")]
    {
        let backend = FlatIndex::build(&vectors);
        debug!(backend = backend.name(), vectors = backend.len(), "built search backend");
        Box::new(backend)
    }
    #[cfg(not(feature = "matrix"))]
    {
        let backend = ScanIndex::build(vectors);
        debug!(backend = backend.name(), vectors = backend.len(), "built search backend");
        Box::new(backend)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Sort scored positions by descending score and keep the top `k`.
///
/// `sort_by` is stable, so equal scores keep insertion order.
fn rank_top_k(mut scored: Vec<(usize, f32)>, top_k: usize) -> Vec<(usize, f32)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// Exact search over a matrix of L2-normalized vectors.
///
/// Normalization happens once at build time; queries are normalized per call
/// and scored with a single matrix-vector product.
#[cfg(feature = "matrix")]
#[derive(Debug)]
pub struct FlatIndex {
    matrix: Array2<f32>,
}

#[cfg(feature = "matrix")]
impl FlatIndex {
    /// Build an index from row vectors. Zero-magnitude rows stay zero and
    /// score 0.0 against every query.
    pub fn build(vectors: &[Vec<f32>]) -> Self {
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        let mut matrix = Array2::zeros((vectors.len(), dim));
        for (row, vector) in vectors.iter().enumerate() {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for (col, value) in vector.iter().enumerate() {
                    matrix[(row, col)] = value / norm;
                }
            }
        }
        Self { matrix }
    }
}

#[cfg(feature = "matrix")]
impl SearchBackend for FlatIndex {
    fn len(&self) -> usize {
        self.matrix.nrows()
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        allowed: Option<&HashSet<usize>>,
    ) -> Vec<(usize, f32)> {
        if self.matrix.nrows() == 0 || query.len() != self.matrix.ncols() {
            return Vec::new();
        }

        let norm: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized: Array1<f32> = if norm > 0.0 {
            query.iter().map(|x| x / norm).collect()
        } else {
            Array1::zeros(query.len())
        };

        let scores = self.matrix.dot(&normalized);
        let scored = scores
            .iter()
            .enumerate()
            .filter(|(position, _)| allowed.is_none_or(|set| set.contains(position)))
            .map(|(position, score)| (position, *score))
            .collect();
        rank_top_k(scored, top_k)
    }

    fn name(&self) -> &'static str {
        "flat"
    }
}

/// Brute-force cosine scan over unnormalized vectors.
///
/// Always available; equivalent ranking to [`FlatIndex`].
#[derive(Debug)]
pub struct ScanIndex {
    vectors: Vec<Vec<f32>>,
}

impl ScanIndex {
    /// Build an index that keeps the vectors as given.
    pub fn build(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors }
    }
}

impl SearchBackend for ScanIndex {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        allowed: Option<&HashSet<usize>>,
    ) -> Vec<(usize, f32)> {
        // Same contract as the matrix backend: a query of the wrong
        // dimension matches nothing.
        if self.vectors.first().is_some_and(|v| v.len() != query.len()) {
            return Vec::new();
        }
        let scored = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(position, _)| allowed.is_none_or(|set| set.contains(position)))
            .map(|(position, vector)| (position, cosine_similarity(vector, query)))
            .collect();
        rank_top_k(scored, top_k)
    }

    fn name(&self) -> &'static str {
        "scan"
    }
}
