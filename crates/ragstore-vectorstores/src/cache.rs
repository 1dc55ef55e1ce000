use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use ragstore_core::{SearchOptions, VectorSearchResult};
use sha2::{Digest, Sha256};

struct Entries {
    lru: LruCache<String, Vec<VectorSearchResult>>,
    /// Bumped by every `clear`.
    generation: u64,
}

/// Bounded LRU of search results.
///
/// A result computed before a `clear` is dropped on `put`, so a search that
/// overlaps a write never repopulates the cache with pre-write results.
pub(crate) struct QueryCache {
    entries: Mutex<Entries>,
}

impl QueryCache {
    /// `None` when `capacity` is 0.
    pub(crate) fn new(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|cap| Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(cap),
                generation: 0,
            }),
        })
    }

    /// SHA-256 over every query component's bits and the options' JSON form.
    pub(crate) fn key(query: &[f32], options: &SearchOptions) -> String {
        let mut hasher = Sha256::new();
        for x in query {
            hasher.update(x.to_le_bytes());
        }
        hasher.update(b"|");
        // SearchOptions is plain data with ordered maps; serialization cannot fail.
        hasher.update(serde_json::to_vec(options).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<VectorSearchResult>> {
        self.lock().lru.get(key).cloned()
    }

    /// Token to hand back to [`put`](Self::put) for results computed from now on.
    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Store `results` unless the cache was cleared since `generation` was taken.
    pub(crate) fn put(&self, key: String, results: Vec<VectorSearchResult>, generation: u64) -> bool {
        let mut entries = self.lock();
        if entries.generation != generation {
            return false;
        }
        entries.lru.put(key, results);
        true
    }

    pub(crate) fn clear(&self) {
        let mut entries = self.lock();
        entries.lru.clear();
        entries.generation = entries.generation.wrapping_add(1);
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().lru.len()
    }
}
