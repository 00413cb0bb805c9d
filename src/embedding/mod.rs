//! Embedding generation, caching, and similarity.
//!
//! The router compares a normalized intent against every catalog tool in
//! vector space. This module owns the vector type, the cosine measure, and
//! the service that composes canonical text, consults the TTL cache, and
//! falls through to the pluggable provider.

mod cache;
mod provider;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use cache::EmbeddingCache;
pub use provider::{EmbeddingProvider, HashEmbedder};

use crate::config::EmbeddingsConfig;
use crate::error::EmbeddingError;
use crate::types::{NormalizedIntent, ToolDefinition};

/// A fixed-dimension, L2-normalized vector tagged with the model that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
}

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.vector.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// Cosine similarity in [-1, 1].
///
/// Errors when the vectors disagree on length; zero-magnitude input yields
/// a similarity of 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok((dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

/// Canonical JSON rendering (sorted keys) used for cache keys and
/// change detection.
pub fn canonical_json(value: &Value) -> String {
    serde_jcs::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Produces deterministic, L2-normalized vectors for intents and tool
/// descriptors, cached by canonical key.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    dimensions: usize,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingsConfig) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(Duration::from_millis(config.cache_ttl_ms)),
            dimensions: config.dimensions,
        }
    }

    /// Configured vector dimension.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a normalized intent, keyed by category, action, and canonical
    /// parameters.
    pub async fn embed_intent(
        &self,
        intent: &NormalizedIntent,
    ) -> Result<Embedding, EmbeddingError> {
        let params = canonical_json(&Value::Object(intent.parameters.clone()));
        let key = format!("intent|{}|{}|{}", intent.category, intent.action, params);
        let text = format!(
            "Action: {}\nCategory: {}\nTarget: {}\nParameters: {}",
            intent.action, intent.category, intent.target, params
        );
        self.embed_text(key, &text).await
    }

    /// Embed a tool descriptor, keyed by name.
    pub async fn embed_tool(&self, tool: &ToolDefinition) -> Result<Embedding, EmbeddingError> {
        let key = format!("tool|{}", tool.name);
        let text = format!("{}: {}", tool.name, tool.description);
        self.embed_text(key, &text).await
    }

    async fn embed_text(&self, key: String, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let raw = self.provider.embed(text).await?;
        if raw.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: raw.len(),
            });
        }

        let embedding = Embedding {
            vector: l2_normalize(raw),
            model: self.provider.model().to_string(),
        };
        self.cache.insert(key, embedding.clone()).await;
        Ok(embedding)
    }
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntentCategory;

    const EPS: f32 = 1e-5;

    fn service() -> EmbeddingService {
        let config = EmbeddingsConfig {
            model: "hash-embedder-v1".to_string(),
            dimensions: 384,
            cache_ttl_ms: 300_000,
        };
        EmbeddingService::new(
            Arc::new(HashEmbedder::new(&config.model, config.dimensions)),
            &config,
        )
    }

    #[test]
    fn test_cosine_self_similarity_is_one() {
        let v = l2_normalize(vec![0.3, -0.5, 0.8, 0.1]);
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = l2_normalize(vec![0.2, 0.9, -0.4]);
        let b = l2_normalize(vec![-0.7, 0.1, 0.5]);
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < EPS);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = serde_json::json!({"zeta": 1, "alpha": {"nested_z": 2, "nested_a": 3}});
        let canonical = canonical_json(&value);
        assert!(canonical.find("alpha").unwrap() < canonical.find("zeta").unwrap());
        assert!(canonical.find("nested_a").unwrap() < canonical.find("nested_z").unwrap());
    }

    #[tokio::test]
    async fn test_embed_intent_dimension_and_norm() {
        let svc = service();
        let intent = NormalizedIntent::new(IntentCategory::ToolCall, "search")
            .with_target("tool")
            .with_confidence(1.0);

        let embedding = svc.embed_intent(&intent).await.unwrap();
        assert_eq!(embedding.dimension(), 384);
        assert!((embedding.norm() - 1.0).abs() < EPS);
        assert_eq!(embedding.model, "hash-embedder-v1");
    }

    #[tokio::test]
    async fn test_embed_intent_is_cached() {
        let svc = service();
        let intent = NormalizedIntent::new(IntentCategory::Analysis, "summarize");

        let first = svc.embed_intent(&intent).await.unwrap();
        let second = svc.embed_intent(&intent).await.unwrap();
        assert_eq!(first.vector, second.vector);
    }

    #[tokio::test]
    async fn test_embed_tool_key_ignores_description_changes_within_ttl() {
        let svc = service();
        let tool = ToolDefinition::new("web_search", "search the web");
        let first = svc.embed_tool(&tool).await.unwrap();

        // Same name, different description: cache key is `tool|name`, so
        // the cached vector is returned until the TTL lapses.
        let mut renamed = tool.clone();
        renamed.description = "search the internet".to_string();
        let second = svc.embed_tool(&renamed).await.unwrap();
        assert_eq!(first.vector, second.vector);
    }

    #[tokio::test]
    async fn test_parameter_order_does_not_change_key() {
        let svc = service();

        let mut a = NormalizedIntent::new(IntentCategory::ToolCall, "search");
        a.parameters
            .insert("q".to_string(), serde_json::json!("rust"));
        a.parameters
            .insert("limit".to_string(), serde_json::json!(5));

        let mut b = NormalizedIntent::new(IntentCategory::ToolCall, "search");
        b.parameters
            .insert("limit".to_string(), serde_json::json!(5));
        b.parameters
            .insert("q".to_string(), serde_json::json!("rust"));

        let ea = svc.embed_intent(&a).await.unwrap();
        let eb = svc.embed_intent(&b).await.unwrap();
        assert_eq!(ea.vector, eb.vector);
    }
}
