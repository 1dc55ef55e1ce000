use ragstore_config::{BackendType, PerformanceProfile, UseCase};
use ragstore_core::SearchOptions;
use ragstore_vectorstores::VectorStoreBenchmark;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How to build a store through the factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreCreationOptions {
    #[serde(rename = "type")]
    pub backend: BackendType,
    /// Partial [`VectorStoreConfig`](ragstore_config::VectorStoreConfig) JSON,
    /// deep-merged onto the use-case preset.
    pub overrides: Option<Value>,
    pub performance_profile: Option<PerformanceProfile>,
    pub use_case: Option<UseCase>,
    /// Size concurrency and caches from the host's resources.
    pub auto_tune: bool,
}

impl Default for VectorStoreCreationOptions {
    fn default() -> Self {
        Self {
            backend: BackendType::Sqlite,
            overrides: None,
            performance_profile: Some(PerformanceProfile::Balanced),
            use_case: Some(UseCase::Search),
            auto_tune: true,
        }
    }
}

impl VectorStoreCreationOptions {
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: PerformanceProfile) -> Self {
        self.performance_profile = Some(profile);
        self
    }

    pub fn with_use_case(mut self, use_case: UseCase) -> Self {
        self.use_case = Some(use_case);
        self
    }

    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_auto_tune(mut self, auto_tune: bool) -> Self {
        self.auto_tune = auto_tune;
        self
    }
}

/// Constraints for [`VectorStoreFactory::best_configuration`](crate::VectorStoreFactory::best_configuration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRequirements {
    pub max_vector_count: usize,
    pub dimension: usize,
    pub max_memory_mb: f64,
    pub prioritize_speed: bool,
    pub use_case: UseCase,
}

/// One entry of a [`benchmark_configurations`](crate::VectorStoreFactory::benchmark_configurations) ranking.
#[derive(Debug, Clone)]
pub struct RankedConfiguration {
    pub options: VectorStoreCreationOptions,
    pub benchmark: VectorStoreBenchmark,
    pub score: f64,
}

/// Options for [`RetrievalService::hybrid_search`](crate::RetrievalService::hybrid_search).
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchOptions {
    /// `top_k` here is the size of the final merged list.
    pub search: SearchOptions,
    pub vector_weight: f32,
    pub text_weight: f32,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            search: SearchOptions::default(),
            vector_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

impl HybridSearchOptions {
    pub fn new(search: SearchOptions) -> Self {
        Self {
            search,
            ..Self::default()
        }
    }

    pub fn with_weights(mut self, vector_weight: f32, text_weight: f32) -> Self {
        self.vector_weight = vector_weight;
        self.text_weight = text_weight;
        self
    }
}

/// Outcome of [`RetrievalService::validate_vector_dimension`](crate::RetrievalService::validate_vector_dimension).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionCheck {
    pub is_valid: bool,
    pub dimension: Option<usize>,
    pub error: Option<String>,
}
