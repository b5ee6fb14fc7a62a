//! Semantic search over catalog titles and descriptions.
//!
//! Offline, catalog rows are chunked, embedded and persisted as a
//! row-aligned vector matrix. Online, the matrix is loaded once and queries
//! are scored against it with an adaptive similarity threshold.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed behind the [`Embedder`] trait
//! - `preprocess`: Description chunking and query normalization
//! - `builder`: Catalog -> vectors -> persisted store
//! - `index`: Vector matrix, per-row metadata and scoring
//! - `vector`: Norm and similarity helpers
//! - `storage`: `vectors.bin` / `metadata.json` persistence
//! - `threshold`: Adaptive threshold backoff
//! - `fusion`: Single-field and combined ranking
//! - `highlight`: Highlight phrase extraction
//! - `service`: Lazy-loading search service

pub mod builder;
pub mod embeddings;
pub mod fusion;
pub mod highlight;
pub mod index;
pub mod preprocess;
mod service;
pub mod storage;
pub mod threshold;
pub mod vector;

pub use builder::{BuildError, BuildReport, IndexBuilder};
pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use fusion::{FieldScores, FusedResult, QueryResult, RawScore, RawScores, SearchOutcome};
pub use index::{EmbeddingRecord, Field, IndexError, VectorMatrix, VectorStore};
pub use service::{
    EmbedderFactory, EngineStatus, LoadedEngine, ModelInfo, SemanticSearchError,
    SemanticSearchService,
};
pub use storage::{LoadOutcome, VectorStorage, VectorStorageError};
pub use threshold::{ThresholdOutcome, ThresholdPolicy};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Output width of the default model
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Starting similarity threshold for searches
pub const DEFAULT_THRESHOLD: f32 = 0.60;

/// Threshold floor for the adaptive backoff
pub const DEFAULT_MIN_THRESHOLD: f32 = 0.45;

pub const DEFAULT_THRESHOLD_STEP: f32 = 0.05;
