//! Deterministic embedders for tests that must not download a model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::semantic::{Embedder, EmbeddingError};

/// Embeds any text by hashing it. Stable across runs, meaningless as semantics.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash-embedder"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let digest = Sha256::digest(text.as_bytes());
        Ok((0..self.dimensions)
            .map(|i| (digest[i % digest.len()] ^ i as u8) as f32 / 255.0 - 0.5)
            .collect())
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Maps known texts to fixed vectors so tests control every score.
///
/// Unknown texts are an error. Counts embedding calls.
pub struct ScriptedEmbedder {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimensions, "{text}");
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for ScriptedEmbedder {
    fn name(&self) -> &str {
        "scripted-embedder"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed(format!("unscripted text: {text:?}")))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Unit vector whose dot product with the first axis is `score`.
///
/// The remainder goes on `axis`, so vectors built on different axes are
/// orthogonal apart from their first component.
pub fn scored_vector(dimensions: usize, score: f32, axis: usize) -> Vec<f32> {
    assert!(axis > 0 && axis < dimensions);
    let mut v = vec![0.0; dimensions];
    v[0] = score;
    v[axis] = (1.0 - score * score).max(0.0).sqrt();
    v
}

/// Unit vector along one axis.
pub fn axis_vector(dimensions: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dimensions];
    v[axis] = 1.0;
    v
}

/// Counts how many times a factory produced an embedder.
#[derive(Clone, Default)]
pub struct LoadCounter(Arc<AtomicUsize>);

impl LoadCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
