//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - The [`Embedder`] seam used by the index builder and the search service
//! - Model loading with configurable cache directory
//! - Batch embedding generation

use fastembed::{InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A deterministic text -> vector function of fixed dimension.
pub trait Embedder: Send + Sync {
    /// Model name, recorded alongside the persisted vectors
    fn name(&self) -> &str;

    /// Output dimension of every embedding
    fn dimensions(&self) -> usize;

    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// SHA256 of the model name, used to tag storage files.
    fn model_id(&self) -> [u8; 32] {
        model_id_hash(self.name())
    }
}

/// Compute SHA256 hash of a model name for storage identification.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Model '{model}' produces {got}-dimensional vectors, configured for {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    ///
    /// # Arguments
    /// * `model_name` - Name of the model (e.g., "all-MiniLM-L6-v2")
    /// * `cache_dir` - Directory to cache downloaded models
    /// * `download_timeout` - Optional timeout for model download
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!(
            "Loading embedding model '{}' (download timeout {}s)",
            model_name,
            timeout.as_secs()
        );

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let (model, dimensions) = run_with_timeout(timeout, move || {
            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
            let dimensions = Self::detect_dimensions(&mut model)?;
            Ok((model, dimensions))
        })?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Load the model and verify it produces `expected_dimensions`-wide vectors.
    pub fn new_checked(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
        expected_dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let model = Self::new(model_name, cache_dir, download_timeout)?;
        if model.dimensions != expected_dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                model: model_name.to_string(),
                expected: expected_dimensions,
                got: model.dimensions,
            });
        }
        Ok(model)
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(
        name: &str,
    ) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        let lowered = name.to_lowercase();
        let short = lowered
            .strip_prefix("sentence-transformers/")
            .unwrap_or(&lowered);

        match short {
            "all-minilm-l6-v2" | "allminiml6v2" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
            }
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15)
            }
            "bge-base-en-v1.5" | "bgebaseenv15" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15)
            }
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix to MiniLM for quantized)",
                name
            ))),
        }
    }

    /// Embed a sample text to learn the output dimension.
    fn detect_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to detect dimensions: {}", e))
            })?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

/// Run a model load on a worker thread and give up after `timeout`.
///
/// A load that outlives the timeout keeps running on its thread until it
/// finishes; its result is dropped.
fn run_with_timeout<T, F>(timeout: Duration, load: F) -> Result<T, EmbeddingError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("embedding-model-load".to_string())
        .spawn(move || {
            let _ = tx.send(load());
        })
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to spawn loader: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EmbeddingError::InitFailed(format!(
            "model load timed out after {}s",
            timeout.as_secs_f32()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(
            "model loader exited without a result".to_string(),
        )),
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation() {
        let temp_dir = std::env::temp_dir().join("bookseek-embed-test");
        let model = EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.clone(), None);
        assert!(model.is_ok());

        let model = model.unwrap();
        assert_eq!(model.name(), "all-MiniLM-L6-v2");
        assert_eq!(model.dimensions(), 384); // MiniLM produces 384-dim embeddings

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_dimension_check() {
        let temp_dir = std::env::temp_dir().join("bookseek-embed-dims");
        let result = EmbeddingModel::new_checked("all-MiniLM-L6-v2", temp_dir.clone(), None, 768);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 768, got: 384, .. })
        ));

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = std::env::temp_dir().join("bookseek-embed-invalid");
        let result = EmbeddingModel::new("nonexistent-model", temp_dir, None);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_sentence_transformers_prefix_accepted() {
        let parsed = EmbeddingModel::parse_model_name("sentence-transformers/all-MiniLM-L6-v2");
        assert!(matches!(parsed, Ok(fastembed::EmbeddingModel::AllMiniLML6V2)));
    }

    #[test]
    fn test_slow_load_times_out() {
        let result = run_with_timeout(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_secs(2));
            Ok(1usize)
        });
        match result {
            Err(EmbeddingError::InitFailed(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_load_within_timeout_returns_result() {
        let result = run_with_timeout(Duration::from_secs(5), || Ok(384usize));
        assert_eq!(result.unwrap(), 384);
    }

    #[test]
    fn test_load_error_passes_through() {
        let result: Result<usize, _> = run_with_timeout(Duration::from_secs(5), || {
            Err(EmbeddingError::InitFailed("no network".to_string()))
        });
        match result {
            Err(EmbeddingError::InitFailed(msg)) => assert_eq!(msg, "no network"),
            other => panic!("expected load error, got {:?}", other),
        }
    }

    #[test]
    fn test_panicking_load_is_reported() {
        let result: Result<usize, _> =
            run_with_timeout(Duration::from_secs(5), || panic!("loader crashed"));
        assert!(matches!(result, Err(EmbeddingError::InitFailed(_))));
    }

    #[test]
    fn test_model_id_hash_consistency() {
        assert_eq!(model_id_hash("all-MiniLM-L6-v2"), model_id_hash("all-MiniLM-L6-v2"));
        assert_ne!(model_id_hash("all-MiniLM-L6-v2"), model_id_hash("bge-base-en-v1.5"));
    }
}
