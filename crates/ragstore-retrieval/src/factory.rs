use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ragstore_config::{
    deep_merge, BackendType, ConfigManager, PerformanceProfile, UseCase, VectorStoreConfig,
    IN_MEMORY,
};
use ragstore_core::{Result, RetrievalError, SimilarityCalculator, VectorStore};
use ragstore_sqlite::SqliteVectorStore;
use ragstore_vectorstores::{InMemoryVectorStore, ManagedVectorStore, VectorStoreBenchmark};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::options::{ConfigurationRequirements, RankedConfiguration, VectorStoreCreationOptions};

/// Memory assumed when the host's is unknown, in MB.
pub const DEFAULT_MEMORY_MB: usize = 1024;

/// Opaque reference to a memoized store, returned by [`VectorStoreFactory::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StoreHandle(u64);

/// What makes two creation requests share one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CreationKey {
    pub backend: BackendType,
    pub profile: Option<PerformanceProfile>,
    pub use_case: Option<UseCase>,
    /// `path#table` for SQLite, `url#collection` for Qdrant.
    pub location: String,
}

/// Host resources that drive [`VectorStoreFactory::auto_tune`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemResources {
    pub cpu_cores: usize,
    pub memory_mb: usize,
}

impl SystemResources {
    /// CPU count from the OS; memory falls back to [`DEFAULT_MEMORY_MB`].
    pub fn detect() -> Self {
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            cpu_cores,
            memory_mb: DEFAULT_MEMORY_MB,
        }
    }
}

impl Default for SystemResources {
    fn default() -> Self {
        Self::detect()
    }
}

struct Instance {
    creation_key: CreationKey,
    config: VectorStoreConfig,
    store: Arc<ManagedVectorStore>,
    refs: usize,
}

/// A memoized store as reported by [`VectorStoreFactory::cache_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedInstance {
    pub handle: StoreHandle,
    pub key: CreationKey,
    pub refs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactoryCacheStats {
    pub instance_count: usize,
    pub instances: Vec<CachedInstance>,
}

/// Builds [`ManagedVectorStore`]s and shares them between callers.
///
/// Stores created with [`create`](Self::create) are reference-counted by
/// [`StoreHandle`]: requests with the same [`CreationKey`] get the same store,
/// and the store is closed when the last handle is [`release`](Self::release)d.
pub struct VectorStoreFactory {
    calculator: Arc<SimilarityCalculator>,
    resources: SystemResources,
    next_handle: AtomicU64,
    by_key: DashMap<CreationKey, StoreHandle>,
    instances: DashMap<StoreHandle, Instance>,
}

impl Default for VectorStoreFactory {
    fn default() -> Self {
        Self::new(Arc::new(SimilarityCalculator::new()))
    }
}

impl VectorStoreFactory {
    pub fn new(calculator: Arc<SimilarityCalculator>) -> Self {
        Self::with_resources(calculator, SystemResources::detect())
    }

    pub fn with_resources(calculator: Arc<SimilarityCalculator>, resources: SystemResources) -> Self {
        Self {
            calculator,
            resources,
            next_handle: AtomicU64::new(1),
            by_key: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    pub fn calculator(&self) -> &Arc<SimilarityCalculator> {
        &self.calculator
    }

    pub fn resources(&self) -> SystemResources {
        self.resources
    }

    /// Get or build the shared store for `options`, taking one reference to it.
    pub fn create(
        &self,
        options: &VectorStoreCreationOptions,
    ) -> Result<(StoreHandle, Arc<ManagedVectorStore>)> {
        let manager = self.config_manager(options)?;
        let key = CreationKey {
            backend: manager.config().backend,
            profile: options.performance_profile,
            use_case: options.use_case,
            location: manager.config().location(),
        };

        let entry = self.by_key.entry(key.clone());
        if let Entry::Occupied(existing) = &entry {
            let handle = *existing.get();
            if let Some(mut instance) = self.instances.get_mut(&handle) {
                if &instance.config != manager.config() {
                    return Err(RetrievalError::Config(format!(
                        "{} is already open with a different configuration ({})",
                        key.location,
                        describe_conflict(&instance.config, manager.config())
                    )));
                }
                instance.refs += 1;
                debug!(?handle, refs = instance.refs, location = %key.location, "reusing vector store");
                return Ok((handle, instance.store.clone()));
            }
        }

        let config = manager.config().clone();
        let store = self.build(manager)?;
        let handle = StoreHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.instances.insert(
            handle,
            Instance {
                creation_key: key.clone(),
                config,
                store: store.clone(),
                refs: 1,
            },
        );
        entry.insert(handle);
        info!(
            ?handle,
            backend = key.backend.as_str(),
            profile = ?key.profile,
            use_case = ?key.use_case,
            location = %key.location,
            "created vector store"
        );
        Ok((handle, store))
    }

    pub fn get(&self, handle: StoreHandle) -> Option<Arc<ManagedVectorStore>> {
        self.instances.get(&handle).map(|i| i.store.clone())
    }

    /// Drop one reference. The store is closed and forgotten when none remain.
    ///
    /// Returns whether the store was closed. Unknown handles are ignored.
    pub async fn release(&self, handle: StoreHandle) -> Result<bool> {
        let remaining = match self.instances.get_mut(&handle) {
            Some(mut instance) => {
                instance.refs = instance.refs.saturating_sub(1);
                instance.refs
            }
            None => return Ok(false),
        };
        if remaining > 0 {
            debug!(?handle, refs = remaining, "released vector store reference");
            return Ok(false);
        }

        let Some((_, instance)) = self.instances.remove_if(&handle, |_, i| i.refs == 0) else {
            return Ok(false);
        };
        self.by_key.remove_if(&instance.creation_key, |_, h| *h == handle);
        instance.store.close().await?;
        info!(?handle, location = %instance.creation_key.location, "closed vector store");
        Ok(true)
    }

    /// Build a store nobody else shares. The caller owns closing it.
    pub fn create_dedicated(&self, options: &VectorStoreCreationOptions) -> Result<Arc<ManagedVectorStore>> {
        let manager = self.config_manager(options)?;
        self.build(manager)
    }

    /// Backend and profile suited to a data size.
    pub fn recommended_config(
        vector_count: usize,
        dimension: usize,
        use_case: UseCase,
    ) -> VectorStoreCreationOptions {
        let (backend, mut profile) = match vector_count {
            n if n < 5_000 => (BackendType::Sqlite, PerformanceProfile::MemoryOptimized),
            n if n < 50_000 => (BackendType::Sqlite, PerformanceProfile::Balanced),
            n if n < 200_000 => (BackendType::Sqlite, PerformanceProfile::Performance),
            _ => (BackendType::Qdrant, PerformanceProfile::Performance),
        };
        if backend == BackendType::Sqlite
            && ConfigManager::estimate_memory_mb(vector_count, dimension) > 1000.0
        {
            profile = PerformanceProfile::MemoryOptimized;
        }

        VectorStoreCreationOptions {
            backend,
            overrides: None,
            performance_profile: Some(profile),
            use_case: Some(use_case),
            auto_tune: true,
        }
    }

    /// Estimated working set of `options` holding `vector_count` vectors, in MB.
    pub fn estimate_memory_mb(
        options: &VectorStoreCreationOptions,
        vector_count: usize,
        dimension: usize,
    ) -> f64 {
        let mut multiplier = options
            .performance_profile
            .map_or(1.5, PerformanceProfile::memory_multiplier);
        if options.backend == BackendType::Qdrant {
            multiplier += 0.5;
        }
        ConfigManager::estimate_memory_mb(vector_count, dimension) * multiplier
    }

    /// Pick among the profile candidates those that fit the memory budget.
    ///
    /// If none fits, the most frugal candidate is returned anyway.
    pub fn best_configuration(requirements: &ConfigurationRequirements) -> VectorStoreCreationOptions {
        let candidate = |backend, profile| VectorStoreCreationOptions {
            backend,
            overrides: None,
            performance_profile: Some(profile),
            use_case: Some(requirements.use_case),
            auto_tune: true,
        };
        let mut candidates: Vec<VectorStoreCreationOptions> = PerformanceProfile::ALL
            .iter()
            .map(|p| candidate(BackendType::Sqlite, *p))
            .collect();
        if requirements.max_vector_count > 100_000 {
            candidates.push(candidate(BackendType::Qdrant, PerformanceProfile::Performance));
        }

        let fitting: Vec<&VectorStoreCreationOptions> = candidates
            .iter()
            .filter(|c| {
                Self::estimate_memory_mb(c, requirements.max_vector_count, requirements.dimension)
                    <= requirements.max_memory_mb
            })
            .collect();
        let Some(&first) = fitting.first() else {
            return candidates[0].clone();
        };

        let preferred = if requirements.prioritize_speed {
            PerformanceProfile::Performance
        } else {
            PerformanceProfile::MemoryOptimized
        };
        fitting
            .iter()
            .find(|c| c.performance_profile == Some(preferred))
            .copied()
            .unwrap_or(first)
            .clone()
    }

    /// Benchmark each configuration on a scratch store and rank them best first.
    ///
    /// SQLite candidates run against an in-memory database so user data is
    /// never touched. Configurations that fail are skipped with a warning.
    pub async fn benchmark_configurations(
        &self,
        configs: &[VectorStoreCreationOptions],
        vector_count: usize,
        dimension: usize,
    ) -> Vec<RankedConfiguration> {
        let mut ranked = Vec::with_capacity(configs.len());
        for options in configs {
            match self.benchmark_one(options, vector_count, dimension).await {
                Ok(benchmark) => {
                    let score = benchmark.score();
                    debug!(backend = options.backend.as_str(), profile = ?options.performance_profile, score, "configuration benchmarked");
                    ranked.push(RankedConfiguration {
                        options: options.clone(),
                        benchmark,
                        score,
                    });
                }
                Err(e) => {
                    warn!(
                        backend = options.backend.as_str(),
                        profile = ?options.performance_profile,
                        error = %e,
                        "configuration benchmark failed, skipping"
                    );
                }
            }
        }
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    async fn benchmark_one(
        &self,
        options: &VectorStoreCreationOptions,
        vector_count: usize,
        dimension: usize,
    ) -> Result<VectorStoreBenchmark> {
        let mut scratch = options.clone();
        if scratch.backend == BackendType::Sqlite {
            let mut overrides = scratch.overrides.take().unwrap_or_else(|| json!({}));
            deep_merge(&mut overrides, &json!({ "sqlite": { "path": IN_MEMORY } }));
            scratch.overrides = Some(overrides);
        }
        let store = self.create_dedicated(&scratch)?;
        let result = store.benchmark(vector_count, dimension).await;
        store.close().await?;
        result
    }

    /// Size concurrency and caches from [`SystemResources`].
    pub fn auto_tune(&self, manager: &mut ConfigManager) {
        let concurrency = self.resources.cpu_cores.clamp(1, 8);
        let memory = self.resources.memory_mb;
        manager.update_config(|c| c.indexing_concurrency = concurrency);

        let caches = if memory > 1000 {
            Some((5000, 2000))
        } else if memory > 500 {
            Some((2000, 1000))
        } else {
            None
        };
        if let Some((cache_size, query_cache_size)) = caches {
            manager.update_config(|c| c.cache_size = cache_size);
            manager.update_performance(|p| p.query_cache_size = query_cache_size);
        }
        info!(memory_mb = memory, cpu_cores = self.resources.cpu_cores, concurrency, "auto-tuned vector store");
    }

    /// Close and forget every memoized store. Returns how many were closed.
    pub async fn clear_cache(&self) -> Result<usize> {
        let handles: Vec<StoreHandle> = self.instances.iter().map(|i| *i.key()).collect();
        let mut closed = 0;
        for handle in handles {
            if let Some((_, instance)) = self.instances.remove(&handle) {
                self.by_key.remove_if(&instance.creation_key, |_, h| *h == handle);
                instance.store.close().await?;
                closed += 1;
            }
        }
        info!(closed, "vector store cache cleared");
        Ok(closed)
    }

    pub fn cache_stats(&self) -> FactoryCacheStats {
        let mut instances: Vec<CachedInstance> = self
            .instances
            .iter()
            .map(|entry| CachedInstance {
                handle: *entry.key(),
                key: entry.creation_key.clone(),
                refs: entry.refs,
            })
            .collect();
        instances.sort_by_key(|i| i.handle);
        FactoryCacheStats {
            instance_count: instances.len(),
            instances,
        }
    }

    /// Preset, overrides, profile, then auto-tuning, in that order.
    fn config_manager(&self, options: &VectorStoreCreationOptions) -> Result<ConfigManager> {
        let mut manager = match options.use_case {
            Some(use_case) => ConfigManager::for_use_case(use_case),
            None => ConfigManager::new(options.performance_profile.unwrap_or_default()),
        };
        manager.update_config(|c| c.backend = options.backend);
        if let Some(patch) = &options.overrides {
            manager.merge_json(patch)?;
        }
        if manager.config().backend == BackendType::Qdrant {
            return Err(RetrievalError::Unsupported(
                "qdrant backend is not implemented".to_string(),
            ));
        }
        if let Some(profile) = options.performance_profile {
            manager.switch_profile(profile);
        }
        if options.auto_tune {
            self.auto_tune(&mut manager);
        }
        manager.ensure_valid()?;
        Ok(manager)
    }

    fn build(&self, manager: ConfigManager) -> Result<Arc<ManagedVectorStore>> {
        let (config, performance) = manager.into_parts();
        let engine: Arc<dyn VectorStore> = match config.backend {
            BackendType::Sqlite => Arc::new(SqliteVectorStore::new(&config, self.calculator.clone())?),
            BackendType::Memory => Arc::new(InMemoryVectorStore::with_calculator(
                config.clone(),
                self.calculator.clone(),
            )),
            BackendType::Qdrant => {
                return Err(RetrievalError::Unsupported(
                    "qdrant backend is not implemented".to_string(),
                ))
            }
        };
        Ok(Arc::new(
            ManagedVectorStore::new(engine, config, performance)
                .with_calculator(self.calculator.clone()),
        ))
    }
}

/// Names the settings that differ between an open store and a new request.
fn describe_conflict(open: &VectorStoreConfig, requested: &VectorStoreConfig) -> String {
    let mut diffs = Vec::new();
    if open.similarity_metric != requested.similarity_metric {
        diffs.push(format!(
            "similarity_metric {} vs {}",
            open.similarity_metric, requested.similarity_metric
        ));
    }
    if open.dimension != requested.dimension {
        diffs.push(format!("dimension {:?} vs {:?}", open.dimension, requested.dimension));
    }
    if open.sqlite != requested.sqlite {
        diffs.push("sqlite settings".to_string());
    }
    if open.query_optimization != requested.query_optimization {
        diffs.push("query_optimization".to_string());
    }
    if diffs.is_empty() {
        diffs.push("tuning settings".to_string());
    }
    diffs.join(", ")
}
