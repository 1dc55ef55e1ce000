//! Configuration for ragstore vector stores.
//!
//! A [`ConfigManager`] pairs a [`VectorStoreConfig`] (what to store and how)
//! with a [`PerformanceConfig`] (how hard to work at it). Both can be built
//! from presets ([`PerformanceProfile`], [`UseCase`]), patched with partial
//! JSON, and loaded from TOML / JSON / YAML.

mod format;
mod manager;
mod paths;
mod profile;
mod settings;
mod source;

pub use format::{parse_config, ConfigFormat};
pub use manager::{deep_merge, ConfigDocument, ConfigManager, ValidationReport};
pub use paths::{default_database_path, IN_MEMORY};
pub use profile::{PerformanceConfig, PerformanceProfile, UseCase};
pub use settings::{
    BackendType, IndexOptimization, JournalMode, PragmaSettings, QdrantSettings,
    QueryOptimization, SqliteSettings, Synchronous, TempStore, VectorStoreConfig,
};
pub use source::{
    config_search_paths, discover_and_load, load_from_file, load_from_source, ConfigSource,
    FileConfigSource, RawConfig, StringConfigSource,
};
