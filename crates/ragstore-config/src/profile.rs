use std::fmt;
use std::str::FromStr;

use ragstore_core::RetrievalError;
use serde::{Deserialize, Serialize};

/// Runtime tuning knobs that sit beside a [`VectorStoreConfig`](crate::VectorStoreConfig).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Memory budget in MB.
    pub max_memory_mb: usize,
    pub enable_memory_optimization: bool,
    pub enable_query_cache: bool,
    /// Capacity of the search result cache, in entries.
    pub query_cache_size: usize,
    /// Dispatch write batches concurrently instead of one after another.
    pub enable_parallel_search: bool,
    pub enable_incremental_indexing: bool,
    pub index_compression_level: u8,
    pub enable_approximate_search: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceProfile::Balanced.config()
    }
}

/// Named [`PerformanceConfig`] bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceProfile {
    MemoryOptimized,
    #[default]
    Balanced,
    Performance,
}

impl PerformanceProfile {
    pub const ALL: [PerformanceProfile; 3] = [
        PerformanceProfile::MemoryOptimized,
        PerformanceProfile::Balanced,
        PerformanceProfile::Performance,
    ];

    pub fn config(self) -> PerformanceConfig {
        match self {
            Self::MemoryOptimized => PerformanceConfig {
                max_memory_mb: 256,
                enable_memory_optimization: true,
                enable_query_cache: false,
                query_cache_size: 100,
                enable_parallel_search: false,
                enable_incremental_indexing: true,
                index_compression_level: 9,
                enable_approximate_search: true,
            },
            // Sequential batches: concurrent writers only contend for the one connection.
            Self::Balanced => PerformanceConfig {
                max_memory_mb: 512,
                enable_memory_optimization: true,
                enable_query_cache: true,
                query_cache_size: 1000,
                enable_parallel_search: false,
                enable_incremental_indexing: true,
                index_compression_level: 6,
                enable_approximate_search: false,
            },
            Self::Performance => PerformanceConfig {
                max_memory_mb: 1024,
                enable_memory_optimization: false,
                enable_query_cache: true,
                query_cache_size: 5000,
                enable_parallel_search: true,
                enable_incremental_indexing: false,
                index_compression_level: 1,
                enable_approximate_search: false,
            },
        }
    }

    /// Multiplier applied to the raw vector footprint when estimating memory use.
    pub fn memory_multiplier(self) -> f64 {
        match self {
            Self::MemoryOptimized => 1.2,
            Self::Balanced => 1.5,
            Self::Performance => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MemoryOptimized => "memory_optimized",
            Self::Balanced => "balanced",
            Self::Performance => "performance",
        }
    }
}

impl fmt::Display for PerformanceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerformanceProfile {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory_optimized" => Ok(Self::MemoryOptimized),
            "balanced" => Ok(Self::Balanced),
            "performance" => Ok(Self::Performance),
            other => Err(RetrievalError::Config(format!(
                "unknown performance profile: {other}"
            ))),
        }
    }
}

/// What the store is mainly used for; each picks a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    /// Conversational RAG: fewer, more relevant hits.
    Chat,
    #[default]
    Search,
    /// Bulk offline analysis over large sets.
    Analytics,
}

impl UseCase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Search => "search",
            Self::Analytics => "analytics",
        }
    }

    /// Profile the preset starts from.
    pub fn default_profile(self) -> PerformanceProfile {
        match self {
            Self::Chat => PerformanceProfile::Balanced,
            Self::Search => PerformanceProfile::Performance,
            Self::Analytics => PerformanceProfile::MemoryOptimized,
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "search" => Ok(Self::Search),
            "analytics" => Ok(Self::Analytics),
            other => Err(RetrievalError::Config(format!("unknown use case: {other}"))),
        }
    }
}
