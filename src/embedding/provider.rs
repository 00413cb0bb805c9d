//! Embedding vector sources.
//!
//! The gateway only requires that a provider turns text into a fixed-width
//! vector; whether that happens in-process or over HTTP is its business.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::EmbeddingError;

/// Pluggable source of embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier stored with every embedding this provider produces.
    fn model(&self) -> &str;

    /// Produce a raw vector for the text. The service layer enforces
    /// dimension and normalization invariants.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Deterministic in-process embedder.
///
/// Seeds a xorshift generator from a SHA-256 digest of the input text, so
/// the same text always yields the same vector. Self-consistent similarity
/// is all the routing tests need; swap in a real model client for
/// production-quality semantics.
pub struct HashEmbedder {
    model: String,
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = u64::from_le_bytes(
            digest[..8]
                .try_into()
                .map_err(|_| EmbeddingError::Provider {
                    reason: "digest shorter than 8 bytes".to_string(),
                })?,
        );
        // Zero seed would make xorshift emit zeros forever.
        if seed == 0 {
            seed = u64::from_le_bytes(digest[8..16].try_into().unwrap_or([1; 8])).max(1);
        }

        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            seed = xorshift64star(seed);
            // Map the top 24 bits to [-1, 1].
            let unit = (seed >> 40) as f32 / ((1u64 << 24) - 1) as f32;
            vector.push(unit * 2.0 - 1.0);
        }
        Ok(vector)
    }
}

fn xorshift64star(mut x: u64) -> u64 {
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_is_deterministic() {
        let embedder = HashEmbedder::new("hash-embedder-v1", 384);
        let a = embedder.embed("search the web").await.unwrap();
        let b = embedder.embed("search the web").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_embed_distinct_texts_differ() {
        let embedder = HashEmbedder::new("hash-embedder-v1", 384);
        let a = embedder.embed("search the web").await.unwrap();
        let b = embedder.embed("send an email").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_embed_respects_dimension() {
        let embedder = HashEmbedder::new("hash-embedder-v1", 64);
        let v = embedder.embed("anything").await.unwrap();
        assert_eq!(v.len(), 64);
    }

    #[tokio::test]
    async fn test_embed_values_bounded() {
        let embedder = HashEmbedder::new("hash-embedder-v1", 384);
        let v = embedder.embed("bounded").await.unwrap();
        assert!(v.iter().all(|x| (-1.0..=1.0).contains(x)));
    }
}
