//! Semantic search service for catalog queries.
//!
//! Provides a high-level interface for semantic search operations:
//! - Lazy-loads the embedding model and vector store exactly once
//! - Rebuilds a missing store from the catalog when allowed
//! - Runs single-field, combined and raw-score queries

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::config::SemanticSearchConfig;
use crate::semantic::builder::{BuildError, BuildReport, IndexBuilder};
use crate::semantic::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::semantic::fusion::{self, FusedResult, QueryResult, RawScores, SearchOutcome};
use crate::semantic::index::{Field, IndexError, VectorStore};
use crate::semantic::preprocess::normalize_query;
use crate::semantic::storage::{LoadOutcome, VectorStorage, VectorStorageError};
use crate::semantic::threshold::ThresholdPolicy;

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Semantic search is not ready: {0}")]
    NotReady(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Produces the embedding model on first load.
pub type EmbedderFactory =
    Box<dyn Fn() -> Result<Arc<dyn Embedder>, EmbeddingError> + Send + Sync>;

/// Model and store, immutable once published.
pub struct LoadedEngine {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
}

impl LoadedEngine {
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Score every row against an already normalized query.
    fn score(&self, query: &str) -> Result<Vec<f32>, SemanticSearchError> {
        let embedding = self.embedder.embed(query)?;
        Ok(self.store.score(&embedding)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub loaded: bool,
    pub rows: usize,
    pub entities: usize,
    pub dimensions: usize,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub vector_dimension: usize,
    pub default_threshold: f32,
    pub min_threshold: f32,
    pub threshold_step: f32,
}

/// Service for semantic search over the catalog.
///
/// Loads the embedding model and vector store on first query.
/// Thread-safe; queries after the load take no locks.
pub struct SemanticSearchService {
    config: SemanticSearchConfig,
    storage: VectorStorage,
    catalog: Arc<dyn Catalog>,
    factory: EmbedderFactory,
    show_progress: bool,
    engine: OnceCell<Arc<LoadedEngine>>,
    /// Serializes the slow path of `ensure_loaded`
    init_lock: Mutex<()>,
}

impl SemanticSearchService {
    /// Create a service in the unloaded state.
    ///
    /// # Arguments
    /// * `config` - Semantic search configuration
    /// * `storage_dir` - Directory holding vectors.bin and metadata.json
    /// * `catalog` - Source rows for (re)builds
    /// * `factory` - Creates the embedding model on first load
    pub fn new(
        config: SemanticSearchConfig,
        storage_dir: PathBuf,
        catalog: Arc<dyn Catalog>,
        factory: EmbedderFactory,
    ) -> Self {
        Self {
            config,
            storage: VectorStorage::new(storage_dir),
            catalog,
            factory,
            show_progress: false,
            engine: OnceCell::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Create a service backed by the configured fastembed model.
    ///
    /// Vectors are stored in `base_path`, model files under `base_path/models`.
    pub fn with_model(
        config: SemanticSearchConfig,
        base_path: PathBuf,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let model_name = config.model.clone();
        let dimensions = config.dimensions;
        let timeout = Duration::from_secs(config.download_timeout_secs);
        let cache_dir = base_path.clone();

        let factory: EmbedderFactory = Box::new(move || {
            let model =
                EmbeddingModel::new_checked(&model_name, cache_dir.clone(), Some(timeout), dimensions)?;
            Ok(Arc::new(model) as Arc<dyn Embedder>)
        });

        Self::new(config, base_path, catalog, factory)
    }

    /// Show a progress bar during rebuilds.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy::new(
            self.config.default_threshold,
            self.config.min_threshold,
            self.config.threshold_step,
        )
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Load the model and store, once.
    ///
    /// Concurrent callers block until the first load finishes and then share
    /// its result. A failed load leaves the service unloaded.
    pub fn ensure_loaded(&self) -> Result<Arc<LoadedEngine>, SemanticSearchError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }

        let engine = Arc::new(self.load()?);
        // only this thread can publish while the lock is held
        let _ = self.engine.set(engine.clone());

        Ok(engine)
    }

    fn load(&self) -> Result<LoadedEngine, SemanticSearchError> {
        log::info!(
            "Initializing semantic search with model '{}'",
            self.config.model
        );

        let embedder = self.open_embedder()?;
        let model_id = embedder.model_id();
        let dimensions = self.config.dimensions;

        let store = match self.storage.load_or_signal_missing(&model_id, dimensions)? {
            LoadOutcome::Loaded(store) => store,
            LoadOutcome::Missing => {
                if !self.config.auto_rebuild {
                    return Err(SemanticSearchError::NotReady(
                        "vector store has not been built".to_string(),
                    ));
                }

                log::warn!("No vector store in {}, rebuilding", self.storage.dir().display());
                match self.build_with(embedder.as_ref()) {
                    Ok(_) => {}
                    Err(BuildError::Catalog(e)) => {
                        log::warn!("Catalog unavailable, cannot build vector store: {}", e);
                        return Err(SemanticSearchError::NotReady(e.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }

                self.storage.load(&model_id, dimensions)?
            }
        };

        log::info!(
            "Loaded {} vectors for {} entities",
            store.len(),
            store.entity_count()
        );

        Ok(LoadedEngine { embedder, store })
    }

    fn open_embedder(&self) -> Result<Arc<dyn Embedder>, SemanticSearchError> {
        let embedder = (self.factory)()?;
        if embedder.dimensions() != self.config.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                model: embedder.name().to_string(),
                expected: self.config.dimensions,
                got: embedder.dimensions(),
            }
            .into());
        }
        Ok(embedder)
    }

    fn build_with(&self, embedder: &dyn Embedder) -> Result<BuildReport, BuildError> {
        IndexBuilder::from_config(&self.config)
            .with_progress(self.show_progress)
            .build_and_save(self.catalog.as_ref(), embedder, &self.storage)
    }

    /// Rebuild the persisted store from the catalog.
    ///
    /// An already loaded engine keeps serving the store it loaded.
    pub fn rebuild(&self) -> Result<BuildReport, SemanticSearchError> {
        let report = match self.engine.get() {
            Some(engine) => self.build_with(engine.embedder())?,
            None => {
                let embedder = self.open_embedder()?;
                self.build_with(embedder.as_ref())?
            }
        };
        Ok(report)
    }

    /// Single-field search over titles.
    pub fn search_title(&self, query: &str) -> Result<SearchOutcome<QueryResult>, SemanticSearchError> {
        self.search_fields(query, &[Field::Title])
    }

    /// Single-field search restricted to `fields`; empty means every field.
    pub fn search_fields(
        &self,
        query: &str,
        fields: &[Field],
    ) -> Result<SearchOutcome<QueryResult>, SemanticSearchError> {
        let policy = self.policy();
        let query = normalize_query(query);
        if query.is_empty() {
            return Ok(SearchOutcome::empty(&policy));
        }

        let engine = self.ensure_loaded()?;
        let scores = engine.score(&query)?;

        Ok(fusion::search_fields(
            engine.store(),
            &scores,
            fields,
            &policy,
            self.config.highlight_phrases,
        ))
    }

    /// Entity search on the mean of title and best description chunk.
    pub fn search_combined(&self, query: &str) -> Result<SearchOutcome<FusedResult>, SemanticSearchError> {
        let policy = self.policy();
        let query = normalize_query(query);
        if query.is_empty() {
            return Ok(SearchOutcome::empty(&policy));
        }

        let engine = self.ensure_loaded()?;
        let scores = engine.score(&query)?;

        Ok(fusion::search_combined(
            engine.store(),
            &scores,
            &policy,
            self.config.highlight_phrases,
        ))
    }

    /// Every row's score, for diagnostics.
    pub fn raw_scores(&self, query: &str) -> Result<RawScores, SemanticSearchError> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Ok(RawScores::default());
        }

        let engine = self.ensure_loaded()?;
        let scores = engine.score(&query)?;

        Ok(fusion::raw_scores(engine.store(), &scores))
    }

    /// Current load state. Never triggers a load.
    pub fn status(&self) -> EngineStatus {
        match self.engine.get() {
            Some(engine) => EngineStatus {
                loaded: true,
                rows: engine.store().len(),
                entities: engine.store().entity_count(),
                dimensions: engine.store().dimensions(),
                model: engine.embedder().name().to_string(),
            },
            None => EngineStatus {
                loaded: false,
                rows: 0,
                entities: 0,
                dimensions: self.config.dimensions,
                model: self.config.model.clone(),
            },
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.config.model.clone(),
            vector_dimension: self.config.dimensions,
            default_threshold: self.config.default_threshold,
            min_threshold: self.config.min_threshold,
            threshold_step: self.config.threshold_step,
        }
    }
}
