//! Core types shared by every ragstore crate.
//!
//! - [`VectorStore`]: the contract a storage engine implements.
//! - [`VectorRecord`], [`SearchOptions`], [`VectorSearchResult`], [`StoreStats`]: the data model.
//! - [`SimilarityCalculator`]: owned registry of similarity and distance metrics.
//! - [`RetrievalError`]: the single error type.

mod error;
pub mod similarity;
pub mod text;
mod types;

pub use error::{Result, RetrievalError};
pub use similarity::{
    Candidate, MetricDirection, ScoredCandidate, SimilarityCalculator, SimilarityMetric,
};
pub use types::{
    content_hash, matches_filter, MetadataFilter, SearchOptions, StoreStats, VectorRecord,
    VectorSearchResult, DEFAULT_TOP_K,
};

use async_trait::async_trait;

/// A storage engine for embeddings.
///
/// Engines own persistence and scoring only. Caching, batch validation,
/// option clamping and metrics live in the decorator that wraps an engine
/// (`ragstore_vectorstores::ManagedVectorStore`), so any engine gets them for free.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Open handles and create schema. Must be idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Score candidates against `query` and return them best-first.
    async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<VectorSearchResult>>;

    /// Upsert records by id.
    async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Soft-delete records; unknown ids are ignored.
    async fn remove_vectors(&self, ids: &[String]) -> Result<()>;

    /// Hard-delete every record.
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;

    /// The dimension fixed for this store, if one has been established.
    async fn dimension(&self) -> Result<Option<usize>>;

    /// Load one live record by id.
    async fn get_vector(&self, id: &str) -> Result<Option<VectorRecord>>;

    /// Keyword search over record content. Engines without one return nothing.
    async fn text_search(&self, _query: &str, _options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        Ok(Vec::new())
    }

    /// Periodic maintenance. Returns `true` if any work was done.
    async fn optimize(&self) -> Result<bool> {
        Ok(false)
    }

    /// Release cached memory held by the backend.
    async fn compact(&self) -> Result<()> {
        Ok(())
    }

    /// Release the backend's handles. A later call to `initialize` reopens them.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
