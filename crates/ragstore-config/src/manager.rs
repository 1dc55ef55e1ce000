use ragstore_core::{Result, RetrievalError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::profile::{PerformanceConfig, PerformanceProfile, UseCase};
use crate::settings::{BackendType, QueryOptimization, Synchronous, VectorStoreConfig};
use crate::source::{load_from_source, ConfigSource};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Serialized form of a [`ConfigManager`], shared by file loading and JSON export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    /// Defaults to the use case's profile, then to `balanced`.
    pub profile: Option<PerformanceProfile>,
    /// Preset the `config` overrides are applied on top of.
    pub use_case: Option<UseCase>,
    /// Partial or complete [`VectorStoreConfig`], deep-merged onto the preset.
    pub config: Option<Value>,
    /// Partial or complete [`PerformanceConfig`], deep-merged onto the profile's bundle.
    pub performance: Option<Value>,
}

/// Outcome of [`ConfigManager::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns one [`VectorStoreConfig`] and the [`PerformanceConfig`] that goes with it.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: VectorStoreConfig,
    performance: PerformanceConfig,
    profile: PerformanceProfile,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(PerformanceProfile::default())
    }
}

impl ConfigManager {
    /// Default configuration with `profile`'s performance bundle.
    pub fn new(profile: PerformanceProfile) -> Self {
        Self::with_config(VectorStoreConfig::default(), profile)
    }

    pub fn with_config(config: VectorStoreConfig, profile: PerformanceProfile) -> Self {
        Self {
            config,
            performance: profile.config(),
            profile,
        }
    }

    /// Preset tuned for a use case.
    pub fn for_use_case(use_case: UseCase) -> Self {
        let mut config = VectorStoreConfig::default();
        match use_case {
            UseCase::Chat => {
                config.similarity_metric = "cosine".to_string();
                config.batch_size = 500;
                config.query_optimization = QueryOptimization {
                    enable_prefiltering: true,
                    enable_reranking: true,
                    max_candidates: 5000,
                    similarity_threshold: 0.3,
                };
            }
            UseCase::Search => {
                config.similarity_metric = "cosine".to_string();
                config.batch_size = 2000;
                config.query_optimization = QueryOptimization {
                    enable_prefiltering: true,
                    enable_reranking: false,
                    max_candidates: 20000,
                    similarity_threshold: 0.1,
                };
            }
            UseCase::Analytics => {
                config.similarity_metric = "euclidean".to_string();
                config.batch_size = 10000;
                config.query_optimization = QueryOptimization {
                    enable_prefiltering: false,
                    enable_reranking: false,
                    max_candidates: 50000,
                    similarity_threshold: 0.05,
                };
            }
        }
        Self::with_config(config, use_case.default_profile())
    }

    /// The resolved store configuration.
    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }

    /// The resolved performance settings.
    pub fn performance(&self) -> &PerformanceConfig {
        &self.performance
    }

    /// The profile the performance bundle was last reset from.
    pub fn profile(&self) -> PerformanceProfile {
        self.profile
    }

    pub fn into_parts(self) -> (VectorStoreConfig, PerformanceConfig) {
        (self.config, self.performance)
    }

    pub fn update_config(&mut self, f: impl FnOnce(&mut VectorStoreConfig)) {
        f(&mut self.config);
    }

    /// Deep-merge a partial JSON object into the configuration.
    ///
    /// Objects merge key by key; any other value (including arrays and
    /// `null`) replaces what was there. The result must still deserialize.
    pub fn merge_json(&mut self, patch: &Value) -> Result<()> {
        self.config = merge_into(&self.config, patch)?;
        debug!(patch = %patch, "merged vector store config overrides");
        Ok(())
    }

    pub fn update_performance(&mut self, f: impl FnOnce(&mut PerformanceConfig)) {
        f(&mut self.performance);
    }

    /// Deep-merge a partial JSON object into the performance bundle.
    pub fn merge_performance_json(&mut self, patch: &Value) -> Result<()> {
        self.performance = merge_into(&self.performance, patch)?;
        Ok(())
    }

    /// Replace the performance bundle with `profile`'s.
    pub fn switch_profile(&mut self, profile: PerformanceProfile) {
        if profile != self.profile {
            info!(from = %self.profile, to = %profile, "switching performance profile");
        }
        self.profile = profile;
        self.performance = profile.config();
    }

    /// Raw footprint of `count` vectors of `dimension` f32s, in MB.
    pub fn estimate_memory_mb(count: usize, dimension: usize) -> f64 {
        (count as f64 * dimension as f64 * 4.0) / BYTES_PER_MB
    }

    /// Pick a profile (and, for very large sets, write tuning) for a data size.
    pub fn auto_tune_for_data_size(&mut self, count: usize, dimension: usize) -> PerformanceProfile {
        let estimate = Self::estimate_memory_mb(count, dimension);
        let profile = if estimate > 1000.0 {
            self.config.batch_size = 5000;
            self.config.cache_size = 500;
            if let Some(sqlite) = self.config.sqlite.as_mut() {
                sqlite.pragma_settings.cache_size = 50000;
                sqlite.pragma_settings.synchronous = Synchronous::Off;
            }
            PerformanceProfile::Performance
        } else if estimate > 100.0 {
            PerformanceProfile::Balanced
        } else {
            PerformanceProfile::MemoryOptimized
        };
        debug!(count, dimension, estimate_mb = estimate, profile = %profile, "auto-tuned for data size");
        self.switch_profile(profile);
        profile
    }

    pub fn validate(&self) -> ValidationReport {
        let c = &self.config;
        let mut errors = Vec::new();

        if c.batch_size == 0 {
            errors.push("batch_size must be greater than 0".to_string());
        }
        if c.cache_size == 0 {
            errors.push("cache_size must be greater than 0".to_string());
        }
        if c.indexing_concurrency == 0 {
            errors.push("indexing_concurrency must be greater than 0".to_string());
        }
        if c.dimension == Some(0) {
            errors.push("dimension must be greater than 0".to_string());
        }
        if c.similarity_metric.trim().is_empty() {
            errors.push("similarity_metric must not be empty".to_string());
        }
        match c.backend {
            BackendType::Sqlite => match &c.sqlite {
                None => errors.push("sqlite settings missing".to_string()),
                Some(s) if s.table_name.is_empty() => {
                    errors.push("sqlite table_name must not be empty".to_string())
                }
                Some(s) if s.path.is_empty() => {
                    errors.push("sqlite path must not be empty".to_string())
                }
                Some(_) => {}
            },
            BackendType::Qdrant if c.qdrant.is_none() => {
                errors.push("qdrant settings missing".to_string())
            }
            _ => {}
        }
        let q = &c.query_optimization;
        if q.max_candidates == 0 {
            errors.push("max_candidates must be greater than 0".to_string());
        }
        if !q.similarity_threshold.is_finite() {
            errors.push("similarity_threshold must be finite".to_string());
        }
        if self.performance.enable_query_cache && self.performance.query_cache_size == 0 {
            errors.push("query_cache_size must be greater than 0 when the query cache is on".to_string());
        }

        ValidationReport { errors }
    }

    pub fn ensure_valid(&self) -> Result<()> {
        let report = self.validate();
        if report.is_valid() {
            Ok(())
        } else {
            Err(RetrievalError::Config(report.errors.join("; ")))
        }
    }

    pub fn export_json(&self) -> Result<String> {
        let doc = ConfigDocument {
            profile: Some(self.profile),
            use_case: None,
            config: Some(to_json(&self.config)?),
            performance: Some(to_json(&self.performance)?),
        };
        serde_json::to_string_pretty(&doc)
            .map_err(|e| RetrievalError::Config(format!("failed to serialize config: {e}")))
    }

    pub fn import_json(json: &str) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(json)
            .map_err(|e| RetrievalError::Config(format!("config import failed: {e}")))?;
        Self::from_document(doc)
    }

    /// Load from a TOML, JSON or YAML document.
    pub fn load(source: &dyn ConfigSource) -> Result<Self> {
        let doc: ConfigDocument = load_from_source(source)?;
        Self::from_document(doc)
    }

    /// Build from a parsed document. Explicit fields win over the preset.
    pub fn from_document(doc: ConfigDocument) -> Result<Self> {
        let mut manager = match doc.use_case {
            Some(use_case) => Self::for_use_case(use_case),
            None => Self::default(),
        };
        if let Some(profile) = doc.profile {
            manager.switch_profile(profile);
        }
        if let Some(patch) = doc.config {
            manager.merge_json(&patch)?;
        }
        if let Some(patch) = doc.performance {
            manager.merge_performance_json(&patch)?;
        }
        Ok(manager)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| RetrievalError::Config(format!("failed to serialize config: {e}")))
}

fn merge_into<T>(current: &T, patch: &Value) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut value = to_json(current)?;
    deep_merge(&mut value, patch);
    serde_json::from_value(value)
        .map_err(|e| RetrievalError::Config(format!("invalid config override: {e}")))
}

/// Recursive object merge; non-object patch values replace the target.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
