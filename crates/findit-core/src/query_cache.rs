//! LRU cache for query embeddings (§4.2: "embed the query text (cached
//! LRU, key = lowercased+trimmed)").
//!
//! Caches query embeddings to avoid re-embedding repeated queries.
//! Uses a bounded HashMap plus a recency-ordered key list: both a hit
//! (`get`) and a write (`insert`) move the key to the back, so eviction
//! drops the least-recently-used entry rather than the oldest-inserted
//! one.

use std::collections::HashMap;

/// Default maximum cache size (number of queries)
pub const DEFAULT_CACHE_SIZE: usize = 128;

/// Result of embedding a query (cached or computed)
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    /// The embedding data (flattened float array)
    pub data: Vec<f32>,
    /// Number of tokens in the query
    pub num_tokens: usize,
}

/// LRU cache for query embeddings
///
/// Stores query string -> embedding mapping with bounded capacity.
/// When capacity is reached, the least-recently-used entry is evicted.
#[derive(Debug)]
pub struct QueryCache {
    /// Map from query string to embedding
    entries: HashMap<String, CachedEmbedding>,
    /// Recency order, least-recently-used first. Touched on both `get`
    /// hits and `insert`.
    order: Vec<String>,
    /// Maximum number of entries
    capacity: usize,
    /// Cache hit count for statistics
    hits: u64,
    /// Cache miss count for statistics
    misses: u64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl QueryCache {
    /// Create a new cache with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            capacity: capacity.max(1), // Minimum capacity of 1
            hits: 0,
            misses: 0,
        }
    }

    /// Get a cached embedding for a query, if present
    pub fn get(&mut self, query: &str) -> Option<&CachedEmbedding> {
        if self.entries.contains_key(query) {
            self.hits += 1;
            self.touch(query);
            self.entries.get(query)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Move `query` to the back of the recency order, marking it most
    /// recently used. No-op if `query` isn't tracked.
    fn touch(&mut self, query: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == query) {
            let key = self.order.remove(pos);
            self.order.push(key);
        }
    }

    /// Insert a new embedding into the cache
    ///
    /// If the cache is at capacity, evicts the least-recently-used entry.
    pub fn insert(&mut self, query: String, embedding: CachedEmbedding) {
        // If already present, just update and mark most-recently-used
        if let std::collections::hash_map::Entry::Occupied(mut e) =
            self.entries.entry(query.clone())
        {
            e.insert(embedding);
            self.touch(&query);
            return;
        }

        // Evict least-recently-used entries if at capacity
        while self.order.len() >= self.capacity {
            if !self.order.is_empty() {
                let lru = self.order.remove(0);
                self.entries.remove(&lru);
            }
        }

        // Insert new entry as most-recently-used
        self.order.push(query.clone());
        self.entries.insert(query, embedding);
    }

    /// Clear all cached entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Get the number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache hit count
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Get cache miss count
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get the cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
