//! SQLite engine for ragstore.
//!
//! This crate provides [`SqliteVectorStore`], an implementation of the
//! [`VectorStore`](ragstore_core::VectorStore) trait that keeps embeddings as
//! BLOBs in a single table, pushes metadata filters down to SQL and scores
//! candidates in parallel.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ragstore_config::VectorStoreConfig;
//! use ragstore_core::{SimilarityCalculator, VectorStore};
//! use ragstore_sqlite::SqliteVectorStore;
//!
//! # async fn example() -> ragstore_core::Result<()> {
//! // In-memory database (great for testing)
//! let store = SqliteVectorStore::new(
//!     &VectorStoreConfig::in_memory(),
//!     Arc::new(SimilarityCalculator::new()),
//! )?;
//! store.initialize().await?;
//! # Ok(())
//! # }
//! ```

mod codec;
mod query;
mod retry;
mod schema;
mod vectorstore;

pub use codec::{blob_to_embed, embed_to_blob};
pub use retry::{is_transient, is_transient_message, RetryPolicy};
pub use schema::validate_identifier;
pub use vectorstore::SqliteVectorStore;

// Re-export core traits for convenience.
pub use ragstore_core::VectorStore;
