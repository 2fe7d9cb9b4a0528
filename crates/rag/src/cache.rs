//! Query-result cache and embedding cache.
//!
//! Both are bounded LRU caches with a TTL, so a burst of repeated queries
//! (a user rephrasing, a retry after a transient failure) doesn't re-embed
//! or re-search. Sized and timed via `ckd-config`'s `RagConfig`
//! (`query_cache_size`/`query_cache_ttl_secs`, `embedding_cache_size`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A bounded, TTL'd LRU cache. Eviction is FIFO-by-insertion-order once the
/// capacity is exceeded, not true LRU-by-access — sufficient for the
/// write-through-many-reads access pattern query caching sees.
struct BoundedCache<V> {
    capacity: usize,
    ttl: Duration,
    order: Vec<String>,
    entries: HashMap<String, Entry<V>>,
    stats: CacheStats,
}

impl<V: Clone> BoundedCache<V> {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            order: Vec::new(),
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() > self.ttl {
                self.entries.remove(key);
                self.order.retain(|k| k != key);
                self.stats.misses += 1;
                return None;
            }
            self.stats.hits += 1;
            Some(entry.value.clone())
        } else {
            self.stats.misses += 1;
            None
        }
    }

    fn put(&mut self, key: String, value: V) {
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );

        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.first().cloned() {
                self.order.remove(0);
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
            } else {
                break;
            }
        }
    }
}

/// Cache of merged search results, keyed by `collection::query::limit`.
pub struct QueryCache {
    inner: Mutex<BoundedCache<Vec<u8>>>,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            inner: Mutex::new(BoundedCache::new(capacity, Duration::from_secs(ttl_secs))),
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().get(key)
    }

    pub fn put_raw(&self, key: String, value: Vec<u8>) {
        self.inner.lock().put(key, value);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

/// Two-tier embedding cache: a bounded in-memory LRU in front of an
/// optional on-disk directory (one file per cache key) so a process
/// restart doesn't cost a full re-embedding pass.
pub struct EmbeddingCache {
    memory: Mutex<BoundedCache<Vec<f32>>>,
    disk_dir: Option<std::path::PathBuf>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, disk_dir: Option<impl Into<std::path::PathBuf>>) -> Self {
        Self {
            memory: Mutex::new(BoundedCache::new(capacity, Duration::from_secs(86_400))),
            disk_dir: disk_dir.map(Into::into),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        if let Some(hit) = self.memory.lock().get(key) {
            return Some(hit);
        }
        let disk_hit = self.read_disk(key)?;
        self.memory.lock().put(key.to_string(), disk_hit.clone());
        Some(disk_hit)
    }

    pub fn put(&self, key: String, value: Vec<f32>) {
        self.write_disk(&key, &value);
        self.memory.lock().put(key, value);
    }

    pub fn stats(&self) -> CacheStats {
        self.memory.lock().stats
    }

    fn disk_path(&self, key: &str) -> Option<std::path::PathBuf> {
        let dir = self.disk_dir.as_ref()?;
        let digest = key
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64));
        Some(dir.join(format!("{:016x}.bin", digest)))
    }

    fn read_disk(&self, key: &str) -> Option<Vec<f32>> {
        let path = self.disk_path(key)?;
        let bytes = std::fs::read(path).ok()?;
        if bytes.len() % 4 != 0 {
            return None;
        }
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    fn write_disk(&self, key: &str, value: &[f32]) {
        let Some(path) = self.disk_path(key) else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let bytes: Vec<u8> = value.iter().flat_map(|f| f.to_le_bytes()).collect();
        let _ = std::fs::write(path, bytes);
    }
}

pub struct CachedEmbedder<E> {
    inner: E,
    cache: EmbeddingCache,
}

impl<E> CachedEmbedder<E> {
    pub fn new(inner: E, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl CachedEmbedder<crate::ollama_embeddings::OllamaEmbedder> {
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::RagError> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_cache_evicts_oldest() {
        let mut cache: BoundedCache<i32> = BoundedCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("c".to_string(), 3);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn bounded_cache_respects_ttl() {
        let mut cache: BoundedCache<i32> = BoundedCache::new(10, Duration::from_millis(1));
        cache.put("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn query_cache_tracks_stats() {
        let cache = QueryCache::new(10, 60);
        assert!(cache.get_raw("missing").is_none());
        cache.put_raw("k".to_string(), vec![1, 2, 3]);
        assert_eq!(cache.get_raw("k"), Some(vec![1, 2, 3]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
