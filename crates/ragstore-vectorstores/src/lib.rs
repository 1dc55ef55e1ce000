//! Vector store engines and the decorator that manages them.
//!
//! [`ManagedVectorStore`] adds caching, validation, batching and metrics to
//! any [`VectorStore`](ragstore_core::VectorStore) engine.
//! [`InMemoryVectorStore`] is the engine used for tests and scratch stores.

mod benchmark;
mod cache;
mod in_memory;
mod managed;
mod metrics;
mod rerank;

pub use benchmark::{
    generate_test_records, random_vector, VectorStoreBenchmark, DEFAULT_BENCHMARK_DIMENSION,
    DEFAULT_BENCHMARK_VECTORS,
};
pub use in_memory::InMemoryVectorStore;
pub use managed::{validate_batch, ManagedVectorStore};
pub use metrics::{Metric, StoreMetrics, EMA_ALPHA};
pub use rerank::{Reranker, ScoreReranker};
