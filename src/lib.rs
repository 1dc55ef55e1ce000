//! ragstore: embedded vector retrieval for a local-first LLM chat client.
//!
//! This crate re-exports the workspace crates for single-import usage and
//! carries the logging bootstrap.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragstore::core::{SearchOptions, VectorRecord};
//! use ragstore::retrieval::{RetrievalService, VectorStoreCreationOptions, VectorStoreFactory};
//!
//! ragstore::init_tracing(&ragstore::TracingOptions::default())?;
//! let service = RetrievalService::new(
//!     Arc::new(VectorStoreFactory::default()),
//!     VectorStoreCreationOptions::default(),
//! );
//! service.add_vectors(vec![VectorRecord::new("doc-1", "hello", vec![0.1, 0.9])]).await?;
//! let hits = service.search(&[0.1, 0.9], &SearchOptions::new().with_top_k(5)).await?;
//! ```

use ragstore_core::{Result, RetrievalError};
use tracing_subscriber::EnvFilter;

/// Error type, data model, engine trait and similarity metrics.
pub use ragstore_core as core;

/// VectorStoreConfig, performance profiles, use-case presets and ConfigManager.
pub use ragstore_config as config;

/// ManagedVectorStore, rerankers, metrics, benchmarks and the in-memory engine.
pub use ragstore_vectorstores as vectorstores;

/// SQLite engine with retry and maintenance.
pub use ragstore_sqlite as sqlite;

/// VectorStoreFactory and RetrievalService.
pub use ragstore_retrieval as retrieval;

pub use ragstore_core::{SearchOptions, VectorRecord, VectorSearchResult};
pub use ragstore_retrieval::{RetrievalService, VectorStoreCreationOptions, VectorStoreFactory};

/// Filter used when neither `RUST_LOG` nor [`TracingOptions::filter`] is set.
pub const DEFAULT_FILTER: &str = "ragstore=info";

/// Options for [`init_tracing`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracingOptions {
    /// `EnvFilter` directives. `RUST_LOG` wins when set.
    pub filter: Option<String>,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

/// Install a global `tracing` subscriber.
///
/// Fails with [`RetrievalError::Config`] on bad filter directives or when a
/// global subscriber is already installed.
pub fn init_tracing(options: &TracingOptions) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = options.filter.as_deref().unwrap_or(DEFAULT_FILTER);
            EnvFilter::try_new(directives)
                .map_err(|e| RetrievalError::Config(format!("invalid log filter '{directives}': {e}")))?
        }
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| RetrievalError::Config(format!("tracing already initialized: {e}")))
}
