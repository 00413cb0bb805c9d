//! TTL cache for generated embeddings, keyed by canonical text.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::Embedding;

struct CacheEntry {
    embedding: Embedding,
    inserted_at: Instant,
}

/// Key -> vector cache with per-entry insertion timestamps.
///
/// A read past the TTL evicts the entry and reports a miss; the caller
/// regenerates and re-inserts. Reads and writes are each atomic, and a
/// miss racing a concurrent insert is fine: regeneration is idempotent.
pub struct EmbeddingCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a fresh entry. Expired entries are evicted on the spot.
    pub async fn get(&self, key: &str) -> Option<Embedding> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                    return Some(entry.embedding.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but is stale; evict under the write lock. Re-check
        // the timestamp in case a concurrent insert refreshed it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key)
            && entry.inserted_at.elapsed() > self.ttl
        {
            entries.remove(key);
        }
        None
    }

    /// Unconditional upsert; refreshes the insertion timestamp.
    pub async fn insert(&self, key: impl Into<String>, embedding: Embedding) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.into(),
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: Vec<f32>) -> Embedding {
        Embedding {
            vector: values,
            model: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_read_after_write_within_ttl() {
        let cache = EmbeddingCache::new(Duration::from_secs(60));
        let e = embedding(vec![0.6, 0.8]);
        cache.insert("k", e.clone()).await;

        let got = cache.get("k").await.unwrap();
        assert_eq!(got.vector, e.vector);
    }

    #[tokio::test]
    async fn test_read_after_ttl_is_miss_and_evicts() {
        let cache = EmbeddingCache::new(Duration::from_millis(10));
        cache.insert("k", embedding(vec![1.0])).await;

        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_timestamp() {
        let cache = EmbeddingCache::new(Duration::from_millis(40));
        cache.insert("k", embedding(vec![1.0])).await;

        tokio::time::sleep(Duration::from_millis(25)).await;
        cache.insert("k", embedding(vec![2.0])).await;
        tokio::time::sleep(Duration::from_millis(25)).await;

        // 50ms after the first insert but only 25ms after the refresh.
        let got = cache.get("k").await.unwrap();
        assert_eq!(got.vector, vec![2.0]);
    }

    #[tokio::test]
    async fn test_miss_on_unknown_key() {
        let cache = EmbeddingCache::new(Duration::from_secs(60));
        assert!(cache.get("absent").await.is_none());
    }
}
