//! Offline index build: catalog rows -> embeddings -> persisted store.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::catalog::{Catalog, CatalogError};
use crate::config::SemanticSearchConfig;
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{EmbeddingRecord, Field, IndexError, VectorMatrix, VectorStore};
use crate::semantic::preprocess::{chunk_description, DEFAULT_SENTENCES_PER_CHUNK};
use crate::semantic::storage::{VectorStorage, VectorStorageError};
use crate::semantic::DEFAULT_DIMENSIONS;

const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Dimension mismatch: expected {expected}, model produced {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Model returned {got} embeddings for a batch of {expected}")]
    BatchMismatch { expected: usize, got: usize },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),
}

/// Counts from a finished build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub entities: usize,
    pub title_vectors: usize,
    pub chunk_vectors: usize,
}

pub struct IndexBuilder {
    dimensions: usize,
    sentences_per_chunk: usize,
    batch_size: usize,
    show_progress: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl IndexBuilder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            sentences_per_chunk: DEFAULT_SENTENCES_PER_CHUNK,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    pub fn from_config(config: &SemanticSearchConfig) -> Self {
        Self {
            dimensions: config.dimensions,
            sentences_per_chunk: config.sentences_per_chunk,
            batch_size: config.batch_size.max(1),
            show_progress: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Draw a progress bar on stderr while embedding.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Turn catalog rows into the embedding records, in build order.
    ///
    /// Per row: the trimmed title, then each description chunk. Rows with a
    /// blank title are skipped.
    pub fn records(&self, catalog: &dyn Catalog) -> Result<Vec<EmbeddingRecord>, BuildError> {
        let mut rows = catalog.rows()?;
        rows.sort_by_key(|row| row.id);

        let mut records = Vec::new();
        for row in rows {
            let title = row.title.trim();
            if title.is_empty() {
                log::debug!("skipping catalog row {} with blank title", row.id);
                continue;
            }

            records.push(EmbeddingRecord::new(row.id, Field::Title, title));
            for chunk in chunk_description(&row.description, self.sentences_per_chunk) {
                records.push(EmbeddingRecord::new(row.id, Field::DescriptionChunk, chunk));
            }
        }

        Ok(records)
    }

    /// Embed every catalog text and assemble the store. Nothing is written.
    pub fn build(
        &self,
        catalog: &dyn Catalog,
        embedder: &dyn Embedder,
    ) -> Result<(VectorStore, BuildReport), BuildError> {
        if embedder.dimensions() != self.dimensions {
            return Err(BuildError::DimensionMismatch {
                expected: self.dimensions,
                got: embedder.dimensions(),
            });
        }

        let records = self.records(catalog)?;
        let report = report_for(&records);

        log::info!(
            "embedding {} texts ({} titles, {} description chunks) with '{}'",
            records.len(),
            report.title_vectors,
            report.chunk_vectors,
            embedder.name()
        );

        let progress = self.progress_bar(records.len());
        let mut matrix = VectorMatrix::with_capacity(self.dimensions, records.len())?;

        for batch in records.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let embeddings = embedder.embed_batch(&texts)?;

            if embeddings.len() != texts.len() {
                return Err(BuildError::BatchMismatch {
                    expected: texts.len(),
                    got: embeddings.len(),
                });
            }

            for embedding in &embeddings {
                if embedding.len() != self.dimensions {
                    return Err(BuildError::DimensionMismatch {
                        expected: self.dimensions,
                        got: embedding.len(),
                    });
                }
                matrix.push_row(embedding)?;
            }

            progress.inc(batch.len() as u64);
        }

        progress.finish_and_clear();

        let store = VectorStore::new(matrix, records)?;
        Ok((store, report))
    }

    /// Build and atomically replace the persisted store.
    pub fn build_and_save(
        &self,
        catalog: &dyn Catalog,
        embedder: &dyn Embedder,
        storage: &VectorStorage,
    ) -> Result<BuildReport, BuildError> {
        let (store, report) = self.build(catalog, embedder)?;
        storage.save(&store, embedder.name(), &embedder.model_id())?;

        log::info!(
            "saved {} vectors for {} entities to {}",
            store.len(),
            report.entities,
            storage.dir().display()
        );

        Ok(report)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} texts ({percent}%)")
            .map(|style| style.progress_chars("━━╸"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

fn report_for(records: &[EmbeddingRecord]) -> BuildReport {
    let mut report = BuildReport::default();
    let mut last_entity = None;
    for record in records {
        if last_entity != Some(record.entity_id) {
            report.entities += 1;
            last_entity = Some(record.entity_id);
        }
        match record.field {
            Field::Title => report.title_vectors += 1,
            Field::DescriptionChunk => report.chunk_vectors += 1,
        }
    }
    report
}
