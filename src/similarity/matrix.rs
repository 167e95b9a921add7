//! Stacked embedding matrix and batched cosine similarity.
//!
//! Rows are stored contiguously with their L2 norms precomputed once, so
//! scoring a query against every row is a single pass over one buffer.
//! Nothing here assumes the vectors are normalized.

use super::{SimilarityError, SimilarityResult};

/// Dot product of two equal-length slices.
#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

#[inline]
fn cosine_from_parts(dot: f32, norm_a: f32, norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    cosine_from_parts(dot(a, b), l2_norm(a), l2_norm(b))
}

/// Row-major matrix of equally sized embedding vectors.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMatrix {
    values: Vec<f32>,
    norms: Vec<f32>,
    dimension: usize,
}

impl EmbeddingMatrix {
    /// Stack `rows` into a matrix.
    ///
    /// # Errors
    /// Returns `SimilarityError::DimensionMismatch` if a row's length differs
    /// from the first row's.
    pub fn stack<'a, I>(rows: I) -> SimilarityResult<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut matrix = Self::default();
        for row in rows {
            if matrix.norms.is_empty() {
                matrix.dimension = row.len();
            } else if row.len() != matrix.dimension {
                return Err(SimilarityError::DimensionMismatch {
                    expected: matrix.dimension,
                    actual: row.len(),
                });
            }
            matrix.values.extend_from_slice(row);
            matrix.norms.push(l2_norm(row));
        }
        Ok(matrix)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    /// Length of every row (0 for an empty matrix).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimension;
        &self.values[start..start + self.dimension]
    }

    /// Cosine similarity of `query` against every row, in row order.
    ///
    /// # Errors
    /// Returns `SimilarityError::DimensionMismatch` if `query` does not have
    /// the matrix dimension.
    pub fn similarities_to(&self, query: &[f32]) -> SimilarityResult<Vec<f32>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        Ok(self
            .values
            .chunks_exact(self.dimension)
            .zip(&self.norms)
            .map(|(row, &norm)| cosine_from_parts(dot(query, row), query_norm, norm))
            .collect())
    }

    /// Full pairwise similarity matrix of the rows against themselves.
    ///
    /// Only the upper triangle is computed; the lower triangle mirrors it, so
    /// `get(i, j) == get(j, i)` holds exactly.
    pub fn self_similarity(&self) -> SimilarityMatrix {
        let n = self.rows();
        let mut values = vec![0.0f32; n * n];
        for i in 0..n {
            let row_i = self.row(i);
            values[i * n + i] = cosine_from_parts(dot(row_i, row_i), self.norms[i], self.norms[i]);
            for j in (i + 1)..n {
                let sim = cosine_from_parts(dot(row_i, self.row(j)), self.norms[i], self.norms[j]);
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }
        SimilarityMatrix { size: n, values }
    }
}

/// Square, symmetric matrix of pairwise similarities.
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i * self.size + j]
    }

    /// `(i, j, similarity)` for every `i < j`, row by row.
    pub fn upper_triangle(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.size).flat_map(move |i| ((i + 1)..self.size).map(move |j| (i, j, self.get(i, j))))
    }
}
