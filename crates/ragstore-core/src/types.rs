use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Default number of results when a search does not set `top_k`.
pub const DEFAULT_TOP_K: usize = 10;

/// One indexed text chunk: the unit the engine stores and returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl VectorRecord {
    /// A record with no metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }

    /// SHA-256 hex digest of the content, stored alongside the row as a dedup aid.
    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Metadata constraints for a search.
///
/// A JSON array value is an IN-list; any other value is an equality match.
/// Ordered so that the serialized form (used for cache keys) is stable.
pub type MetadataFilter = BTreeMap<String, Value>;

/// Query parameters accepted by every search entry point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: MetadataFilter,
    /// Record ids that must never appear in the results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_ids: Vec<String>,
    #[serde(default)]
    pub include_embeddings: bool,
    #[serde(default)]
    pub rerank: bool,
}

impl SearchOptions {
    /// Defaults: top 10, no threshold, no filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return at most `k` results.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Drop results scoring worse than `threshold` in the metric's own direction.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Require `metadata[key] == value` (or membership, if `value` is an array).
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    /// Never return record `id`.
    pub fn excluding(mut self, id: impl Into<String>) -> Self {
        self.exclude_ids.push(id.into());
        self
    }

    /// Include each hit's embedding in the results.
    pub fn with_embeddings(mut self) -> Self {
        self.include_embeddings = true;
        self
    }

    /// Ask for reranking, applied when the store has it enabled.
    pub fn with_rerank(mut self) -> Self {
        self.rerank = true;
        self
    }

    /// `top_k`, or [`DEFAULT_TOP_K`] when unset.
    pub fn top_k_or_default(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }
}

/// A single ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Aggregate numbers about a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Non-deleted records.
    pub total_vectors: usize,
    /// Established dimension, 0 while the store is still empty and unpinned.
    pub dimension: usize,
    /// Approximate on-disk (or in-memory) footprint in bytes.
    pub index_size: u64,
}

/// Check a record's metadata against a filter.
///
/// Engines that cannot push the filter down to storage use this directly.
pub fn matches_filter(metadata: &HashMap<String, Value>, filter: &MetadataFilter) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = metadata.get(key);
        match expected {
            Value::Array(options) if options.is_empty() => true,
            Value::Array(options) => actual.is_some_and(|a| options.contains(a)),
            Value::Null => actual.map_or(true, Value::is_null),
            other => actual == Some(other),
        }
    })
}
