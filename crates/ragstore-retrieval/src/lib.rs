//! Store creation and the retrieval facade.
//!
//! - [`VectorStoreFactory`]: builds managed stores, shares them by
//!   [`CreationKey`] behind reference-counted [`StoreHandle`]s, recommends and
//!   benchmarks configurations.
//! - [`RetrievalService`]: what the RAG pipeline calls: plain and hybrid
//!   search, writes, similarity helpers, metrics and maintenance.

mod factory;
mod hybrid;
mod options;
mod service;

pub use factory::{
    CachedInstance, CreationKey, FactoryCacheStats, StoreHandle, SystemResources,
    VectorStoreFactory, DEFAULT_MEMORY_MB,
};
pub use hybrid::{combine_results, hybrid_candidates};
pub use options::{
    ConfigurationRequirements, DimensionCheck, HybridSearchOptions, RankedConfiguration,
    VectorStoreCreationOptions,
};
pub use service::RetrievalService;
