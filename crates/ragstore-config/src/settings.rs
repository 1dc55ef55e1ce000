use serde::{Deserialize, Serialize};

use crate::paths::{default_database_path, IN_MEMORY};

/// Storage backend behind a vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Embedded SQLite file.
    #[default]
    Sqlite,
    /// Process-local map; nothing is persisted.
    Memory,
    /// External Qdrant server. Reserved for very large corpora; not implemented.
    Qdrant,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
            Self::Qdrant => "qdrant",
        }
    }
}

/// Top-level vector store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    #[serde(rename = "type")]
    pub backend: BackendType,
    /// Pin the embedding dimension up front. Unset means "first vector wins".
    pub dimension: Option<usize>,
    /// Name of a metric registered in the `SimilarityCalculator`.
    pub similarity_metric: String,
    pub batch_size: usize,
    pub cache_size: usize,
    pub indexing_concurrency: usize,
    pub sqlite: Option<SqliteSettings>,
    pub qdrant: Option<QdrantSettings>,
    pub query_optimization: QueryOptimization,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Sqlite,
            dimension: None,
            similarity_metric: "cosine".to_string(),
            batch_size: 1000,
            cache_size: 1000,
            indexing_concurrency: 4,
            sqlite: Some(SqliteSettings::default()),
            qdrant: None,
            query_optimization: QueryOptimization::default(),
        }
    }
}

impl VectorStoreConfig {
    /// Default config pointed at an in-memory SQLite database (tests, scratch stores).
    pub fn in_memory() -> Self {
        Self {
            sqlite: Some(SqliteSettings::in_memory()),
            ..Self::default()
        }
    }

    /// Where the backing data lives, used to tell stores apart.
    pub fn location(&self) -> String {
        match (self.backend, &self.sqlite, &self.qdrant) {
            (BackendType::Sqlite, Some(s), _) => format!("{}#{}", s.path, s.table_name),
            (BackendType::Qdrant, _, Some(q)) => format!("{}#{}", q.url, q.collection_name),
            (backend, _, _) => backend.as_str().to_string(),
        }
    }
}

/// SQLite backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    /// Database file, or `":memory:"`.
    pub path: String,
    pub table_name: String,
    pub enable_wal: bool,
    pub busy_timeout_ms: u64,
    pub pragma_settings: PragmaSettings,
    pub index_optimization: IndexOptimization,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            table_name: "vector_embeddings".to_string(),
            enable_wal: true,
            busy_timeout_ms: 5000,
            pragma_settings: PragmaSettings::default(),
            index_optimization: IndexOptimization::default(),
        }
    }
}

impl SqliteSettings {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PragmaSettings {
    /// `PRAGMA cache_size`, in pages.
    pub cache_size: i64,
    pub synchronous: Synchronous,
    pub journal_mode: JournalMode,
    pub temp_store: TempStore,
}

impl Default for PragmaSettings {
    fn default() -> Self {
        Self {
            cache_size: 10000,
            synchronous: Synchronous::Normal,
            journal_mode: JournalMode::Wal,
            temp_store: TempStore::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
}

impl JournalMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TempStore {
    Default,
    File,
    Memory,
}

impl TempStore {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::File => "FILE",
            Self::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptimization {
    /// Create the JSON-extracted metadata index.
    pub enable_btree_index: bool,
    pub enable_hash_index: bool,
    /// Minimum hours between two maintenance passes.
    pub vacuum_interval_hours: u64,
    /// Metadata key covered by the JSON-extracted index.
    pub metadata_index_field: String,
}

impl Default for IndexOptimization {
    fn default() -> Self {
        Self {
            enable_btree_index: true,
            enable_hash_index: false,
            vacuum_interval_hours: 24,
            metadata_index_field: "type".to_string(),
        }
    }
}

/// Qdrant backend settings. Accepted and validated, but the backend itself is a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QdrantSettings {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub collection_name: String,
    #[serde(default = "default_qdrant_distance")]
    pub distance: String,
}

fn default_qdrant_distance() -> String {
    "Cosine".to_string()
}

/// Query-time knobs applied before the engine sees a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptimization {
    /// Bound the candidate set (and `top_k`) by `max_candidates`.
    pub enable_prefiltering: bool,
    pub enable_reranking: bool,
    pub max_candidates: usize,
    /// Score floor for similarity metrics; 0 disables it.
    pub similarity_threshold: f32,
}

impl Default for QueryOptimization {
    fn default() -> Self {
        Self {
            enable_prefiltering: true,
            enable_reranking: false,
            max_candidates: 10000,
            similarity_threshold: 0.1,
        }
    }
}
