//! Embedding providers.
//!
//! The worker pool and the in-process fallback only see [`EmbeddingProvider`], so a model-backed
//! implementation can replace [`HashingEmbedder`] without touching the pipeline.

use anyhow::{Result, anyhow};

use crate::search::tokenizer::tokenize;

/// Trait for pluggable embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name, recorded with every stored vector
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts (default: sequential).
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Deterministic feature-hashing embedder.
///
/// Every code-aware token of the input is hashed with blake3 into one of `dimensions` buckets
/// with a hash-derived sign; the result is L2-normalized. Texts sharing identifier parts land
/// close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing-blake3"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(anyhow!("Embedder configured with zero dimensions"));
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(anyhow!("Nothing to embed: input has no tokens"));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in &tokens {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(anyhow!("Degenerate embedding for input"));
        }
        for value in &mut vector {
            *value /= norm;
        }

        Ok(vector)
    }
}
