//! Row-aligned vector matrix with per-row field metadata.
//!
//! Every stored vector is one row of a dense matrix and has exactly one
//! [`EmbeddingRecord`] at the same position. Scoring is a linear scan.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::semantic::vector;

/// Row count above which scoring is spread across the rayon pool.
const PARALLEL_SCORE_MIN_ROWS: usize = 4096;

/// Which catalog field a stored vector was embedded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    DescriptionChunk,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::DescriptionChunk => "description_chunk",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one row of the vector matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Catalog id of the book
    pub entity_id: i64,
    pub field: Field,
    /// The exact text that was embedded
    pub text: String,
    /// Position in the matrix. Implicit in the metadata file.
    #[serde(skip)]
    pub row_index: usize,
}

impl EmbeddingRecord {
    pub fn new(entity_id: i64, field: Field, text: impl Into<String>) -> Self {
        Self {
            entity_id,
            field,
            text: text.into(),
            row_index: 0,
        }
    }
}

/// Dense row-major matrix of fixed-width vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatrix {
    data: Vec<f32>,
    dimensions: usize,
}

impl VectorMatrix {
    /// Create an empty matrix with specified dimensions.
    pub fn new(dimensions: usize) -> Result<Self, IndexError> {
        Self::with_capacity(dimensions, 0)
    }

    /// Create a matrix with room for `rows` rows.
    pub fn with_capacity(dimensions: usize, rows: usize) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        Ok(Self {
            data: Vec::with_capacity(dimensions * rows),
            dimensions,
        })
    }

    /// Wrap raw row-major data as read from storage. Rows are taken as-is.
    pub fn from_raw(dimensions: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        if data.len() % dimensions != 0 {
            return Err(IndexError::InvalidLength {
                len: data.len(),
                dimensions,
            });
        }
        Ok(Self { data, dimensions })
    }

    /// Append a row, L2-normalizing it first.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), IndexError> {
        if row.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: row.len(),
            });
        }
        let start = self.data.len();
        self.data.extend_from_slice(row);
        vector::normalize_in_place(&mut self.data[start..]);
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dimensions
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Immutable vector store: one matrix plus one record per row.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    matrix: VectorMatrix,
    records: Vec<EmbeddingRecord>,
}

impl VectorStore {
    /// Pair a matrix with its metadata.
    ///
    /// Fails if the row count and record count differ. Each record's
    /// `row_index` is set to its position.
    pub fn new(matrix: VectorMatrix, mut records: Vec<EmbeddingRecord>) -> Result<Self, IndexError> {
        if matrix.rows() != records.len() {
            return Err(IndexError::Misaligned {
                rows: matrix.rows(),
                records: records.len(),
            });
        }

        for (idx, record) in records.iter_mut().enumerate() {
            record.row_index = idx;
        }

        Ok(Self { matrix, records })
    }

    pub fn empty(dimensions: usize) -> Result<Self, IndexError> {
        Self::new(VectorMatrix::new(dimensions)?, Vec::new())
    }

    pub fn dimensions(&self) -> usize {
        self.matrix.dimensions()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn matrix(&self) -> &VectorMatrix {
        &self.matrix
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn record(&self, row_index: usize) -> Option<&EmbeddingRecord> {
        self.records.get(row_index)
    }

    /// Number of distinct catalog entities in the store.
    pub fn entity_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.entity_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Score every row against the query.
    ///
    /// The query is normalized first, so each score is the cosine similarity
    /// in [-1, 1]. A zero query scores 0 everywhere. Scores are returned in
    /// row order.
    pub fn score(&self, query: &[f32]) -> Result<Vec<f32>, IndexError> {
        let dimensions = self.dimensions();
        if query.len() != dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: query.len(),
            });
        }

        let query = vector::normalize(query);
        let data = self.matrix.as_slice();

        let scores = if self.len() >= PARALLEL_SCORE_MIN_ROWS {
            data.par_chunks_exact(dimensions)
                .map(|row| vector::dot(row, &query))
                .collect()
        } else {
            data.chunks_exact(dimensions)
                .map(|row| vector::dot(row, &query))
                .collect()
        };

        Ok(scores)
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix has {rows} rows but metadata has {records} records")]
    Misaligned { rows: usize, records: usize },

    #[error("Matrix data of length {len} is not a multiple of {dimensions}")]
    InvalidLength { len: usize, dimensions: usize },

    #[error("Vector dimensions must be greater than 0")]
    ZeroDimensions,
}
