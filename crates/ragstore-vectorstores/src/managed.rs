use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use ragstore_config::{PerformanceConfig, VectorStoreConfig};
use ragstore_core::similarity::all_finite;
use ragstore_core::{
    MetricDirection, Result, RetrievalError, SearchOptions, SimilarityCalculator, StoreStats,
    VectorRecord, VectorSearchResult, VectorStore,
};
use tracing::{debug, info, warn};

use crate::benchmark::{generate_test_records, random_vector, VectorStoreBenchmark};
use crate::cache::QueryCache;
use crate::metrics::{Metric, StoreMetrics};
use crate::rerank::{Reranker, ScoreReranker};

/// Wraps any [`VectorStore`] engine with the behavior every engine shares:
/// lazy initialization, a result cache, search option clamping, reranking,
/// batch validation and chunked writes, smoothed metrics, and a benchmark.
pub struct ManagedVectorStore {
    engine: Arc<dyn VectorStore>,
    config: VectorStoreConfig,
    performance: PerformanceConfig,
    calculator: Arc<SimilarityCalculator>,
    reranker: Arc<dyn Reranker>,
    cache: Option<QueryCache>,
    metrics: Mutex<StoreMetrics>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ManagedVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedVectorStore")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ManagedVectorStore {
    pub fn new(
        engine: Arc<dyn VectorStore>,
        config: VectorStoreConfig,
        performance: PerformanceConfig,
    ) -> Self {
        let cache = if performance.enable_query_cache {
            QueryCache::new(performance.query_cache_size)
        } else {
            None
        };
        Self {
            engine,
            config,
            performance,
            calculator: Arc::new(SimilarityCalculator::new()),
            reranker: Arc::new(ScoreReranker),
            cache,
            metrics: Mutex::new(StoreMetrics::default()),
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Use a shared metric registry (custom metrics included) instead of the built-ins.
    pub fn with_calculator(mut self, calculator: Arc<SimilarityCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn engine(&self) -> &Arc<dyn VectorStore> {
        &self.engine
    }

    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }

    pub fn performance(&self) -> &PerformanceConfig {
        &self.performance
    }

    pub fn calculator(&self) -> &Arc<SimilarityCalculator> {
        &self.calculator
    }

    pub fn metrics(&self) -> StoreMetrics {
        *self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entries currently held by the result cache (0 when it is off).
    pub fn cached_queries(&self) -> usize {
        self.cache.as_ref().map_or(0, QueryCache::len)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Initialize the engine once. Safe to call concurrently and repeatedly.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }
        self.engine
            .initialize()
            .await
            .map_err(|e| self.fail("initialize", e))?;
        self.initialized.store(true, Ordering::Release);
        info!(engine = self.engine.name(), "vector store initialized");
        Ok(())
    }

    pub async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        let started = Instant::now();
        let (results, cache_hit) = self.search_inner(query, options).await?;

        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        metrics.record(Metric::SearchLatency, elapsed_ms(started));
        if self.cache.is_some() {
            metrics.record(Metric::CacheHitRate, if cache_hit { 1.0 } else { 0.0 });
        }
        metrics.record(Metric::ErrorRate, 0.0);
        Ok(results)
    }

    async fn search_inner(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<(Vec<VectorSearchResult>, bool)> {
        self.initialize().await?;

        let cache_slot = self
            .cache
            .as_ref()
            .map(|cache| (QueryCache::key(query, options), cache.generation()));
        if let (Some(cache), Some((key, _))) = (&self.cache, &cache_slot) {
            if let Some(hit) = cache.get(key) {
                debug!(results = hit.len(), "query cache hit");
                return Ok((hit, true));
            }
        }

        let direction = self
            .calculator
            .direction_of(&self.config.similarity_metric)
            .map_err(|e| self.fail("search", e))?;
        self.validate_query(query).await?;

        let optimized = self.optimize_options(options, direction);
        let results = self
            .engine
            .search(query, &optimized)
            .await
            .map_err(|e| self.fail("search", e))?;
        let results = self
            .post_process(query, results, options, direction)
            .await
            .map_err(|e| self.fail("search", e))?;

        if let (Some(cache), Some((key, generation))) = (&self.cache, cache_slot) {
            if !cache.put(key, results.clone(), generation) {
                debug!("cache invalidated during search, result not cached");
            }
        }
        debug!(
            results = results.len(),
            top_k = options.top_k_or_default(),
            "vector search completed"
        );
        Ok((results, false))
    }

    async fn validate_query(&self, query: &[f32]) -> Result<()> {
        let expected = self.expected_dimension().await?;
        check_query(query, expected).map_err(|e| self.fail("search", e))
    }

    /// Clamp `top_k` to `max_candidates` and raise the threshold to the configured floor.
    /// The floor only applies to higher-is-better metrics.
    fn optimize_options(&self, options: &SearchOptions, direction: MetricDirection) -> SearchOptions {
        let q = &self.config.query_optimization;
        let mut optimized = options.clone();
        if q.enable_prefiltering {
            optimized.top_k = Some(options.top_k_or_default().min(q.max_candidates));
        }
        if q.similarity_threshold > 0.0 && direction == MetricDirection::HigherIsBetter {
            optimized.threshold = Some(options.threshold.unwrap_or(0.0).max(q.similarity_threshold));
        }
        optimized
    }

    async fn post_process(
        &self,
        query: &[f32],
        mut results: Vec<VectorSearchResult>,
        options: &SearchOptions,
        direction: MetricDirection,
    ) -> Result<Vec<VectorSearchResult>> {
        if self.config.query_optimization.enable_reranking && options.rerank {
            results = self.reranker.rerank(query, results, direction).await?;
        }
        results.truncate(options.top_k_or_default());
        Ok(results)
    }

    /// Validate the whole batch, then write it in `batch_size` chunks.
    ///
    /// An empty batch is a no-op. Each chunk is handed to the engine as one
    /// call; chunks already written stay written if a later one fails.
    pub async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.initialize().await?;
        if records.is_empty() {
            debug!("add_vectors called with an empty batch, skipping");
            return Ok(());
        }

        let started = Instant::now();
        let expected = self.expected_dimension().await?;
        validate_batch(&records, expected).map_err(|e| self.fail("add_vectors", e))?;

        let count = records.len();
        let batches = chunk(records, self.config.batch_size.max(1));
        let batch_count = batches.len();
        let parallel = self.performance.enable_parallel_search && batch_count > 1;

        let written = if parallel {
            let concurrency = self.config.indexing_concurrency.max(1);
            stream::iter(batches)
                .map(|batch| self.engine.add_vectors(batch))
                .buffer_unordered(concurrency)
                .try_collect::<Vec<()>>()
                .await
                .map(|_| ())
        } else {
            let mut outcome = Ok(());
            for batch in batches {
                if let Err(e) = self.engine.add_vectors(batch).await {
                    outcome = Err(e);
                    break;
                }
            }
            outcome
        };
        // Earlier chunks may have landed even on failure.
        self.invalidate_cache();
        written.map_err(|e| self.fail("add_vectors", e))?;

        let secs = started.elapsed().as_secs_f64().max(1e-6);
        {
            let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            metrics.record(Metric::IndexingThroughput, count as f64 / secs);
            metrics.record(Metric::ErrorRate, 0.0);
        }
        if let Ok(stats) = self.engine.stats().await {
            self.record(Metric::MemoryUsage, stats.index_size as f64);
        }
        info!(count, batches = batch_count, parallel, "indexed vectors");
        Ok(())
    }

    pub async fn remove_vectors(&self, ids: &[String]) -> Result<()> {
        self.initialize().await?;
        if ids.is_empty() {
            return Ok(());
        }
        self.engine
            .remove_vectors(ids)
            .await
            .map_err(|e| self.fail("remove_vectors", e))?;
        self.invalidate_cache();
        self.record(Metric::ErrorRate, 0.0);
        debug!(count = ids.len(), "removed vectors");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.initialize().await?;
        self.engine.clear().await.map_err(|e| self.fail("clear", e))?;
        self.invalidate_cache();
        self.record(Metric::ErrorRate, 0.0);
        info!(engine = self.engine.name(), "vector store cleared");
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.initialize().await?;
        let stats = self.engine.stats().await.map_err(|e| self.fail("stats", e))?;
        self.record(Metric::MemoryUsage, stats.index_size as f64);
        Ok(stats)
    }

    /// The dimension queries and new records must have, if one is established.
    pub async fn dimension(&self) -> Result<Option<usize>> {
        self.initialize().await?;
        self.expected_dimension().await
    }

    pub async fn get_vector(&self, id: &str) -> Result<Option<VectorRecord>> {
        self.initialize().await?;
        self.engine
            .get_vector(id)
            .await
            .map_err(|e| self.fail("get_vector", e))
    }

    pub async fn text_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        self.initialize().await?;
        self.engine
            .text_search(query, options)
            .await
            .map_err(|e| self.fail("text_search", e))
    }

    /// Engine maintenance; returns whether any work was done.
    pub async fn optimize(&self) -> Result<bool> {
        self.initialize().await?;
        let ran = self.engine.optimize().await.map_err(|e| self.fail("optimize", e))?;
        if ran {
            self.invalidate_cache();
        }
        Ok(ran)
    }

    pub async fn compact(&self) -> Result<()> {
        self.initialize().await?;
        self.engine.compact().await.map_err(|e| self.fail("compact", e))
    }

    /// Release the engine's handles. The next operation reinitializes it.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if !self.is_initialized() {
            return Ok(());
        }
        self.invalidate_cache();
        self.engine.close().await.map_err(|e| self.fail("close", e))?;
        self.initialized.store(false, Ordering::Release);
        info!(engine = self.engine.name(), "vector store closed");
        Ok(())
    }

    /// Index `count` random vectors, run one top-10 search, and report timings.
    ///
    /// The generated records (`test_0` ..) are written into this store.
    pub async fn benchmark(&self, count: usize, dimension: usize) -> Result<VectorStoreBenchmark> {
        let records = generate_test_records(count, dimension);
        let query = random_vector(dimension);

        let started = Instant::now();
        self.add_vectors(records).await?;
        let indexing_time_ms = elapsed_ms(started);

        let started = Instant::now();
        let results = self
            .search(&query, &SearchOptions::new().with_top_k(10))
            .await?;
        let search_time_ms = elapsed_ms(started);

        let stats = self.stats().await?;
        let benchmark = VectorStoreBenchmark {
            vector_count: count,
            dimension,
            search_time_ms,
            indexing_time_ms,
            memory_used: stats.index_size,
            accuracy: if results.is_empty() { 0.0 } else { 1.0 },
        };
        info!(
            count,
            dimension,
            indexing_ms = indexing_time_ms,
            search_ms = search_time_ms,
            "benchmark finished"
        );
        Ok(benchmark)
    }

    async fn expected_dimension(&self) -> Result<Option<usize>> {
        if let Some(d) = self.config.dimension {
            return Ok(Some(d));
        }
        self.engine
            .dimension()
            .await
            .map_err(|e| self.fail("dimension", e))
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn record(&self, metric: Metric, sample: f64) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(metric, sample);
    }

    /// Count the failure and give engine errors their operation envelope.
    fn fail(&self, operation: &'static str, error: RetrievalError) -> RetrievalError {
        self.record(Metric::ErrorRate, 1.0);
        if error.is_validation() || matches!(error, RetrievalError::Operation { .. }) {
            return error;
        }
        warn!(operation, error = %error, "vector store operation failed");
        RetrievalError::in_operation(operation, error)
    }
}

fn check_query(query: &[f32], expected: Option<usize>) -> Result<()> {
    if query.is_empty() {
        return Err(RetrievalError::InvalidVector("query vector must not be empty".into()));
    }
    if !all_finite(query) {
        return Err(RetrievalError::InvalidVector(
            "query vector contains non-finite values".into(),
        ));
    }
    match expected {
        Some(expected) if expected != query.len() => Err(RetrievalError::DimensionMismatch {
            expected,
            actual: query.len(),
        }),
        _ => Ok(()),
    }
}

/// Reject a batch that must not reach storage.
pub fn validate_batch(records: &[VectorRecord], expected: Option<usize>) -> Result<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let dimension = expected.unwrap_or(first.embedding.len());
    let mut seen = HashSet::with_capacity(records.len());

    for record in records {
        if record.id.is_empty() {
            return Err(RetrievalError::Validation("record id must not be empty".into()));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(RetrievalError::Validation(format!(
                "duplicate record id in batch: {}",
                record.id
            )));
        }
        if record.embedding.is_empty() {
            return Err(RetrievalError::InvalidVector(format!(
                "record {} has an empty embedding",
                record.id
            )));
        }
        if record.embedding.len() != dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: record.embedding.len(),
            });
        }
        if !all_finite(&record.embedding) {
            return Err(RetrievalError::InvalidVector(format!(
                "record {} contains non-finite values",
                record.id
            )));
        }
    }
    Ok(())
}

fn chunk(records: Vec<VectorRecord>, size: usize) -> Vec<Vec<VectorRecord>> {
    let mut batches = Vec::with_capacity(records.len().div_ceil(size));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
