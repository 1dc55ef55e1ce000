use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragstore_config::{PerformanceConfig, PerformanceProfile, VectorStoreConfig};
use ragstore_core::{
    Result, RetrievalError, SearchOptions, StoreStats, VectorRecord, VectorSearchResult,
    VectorStore,
};
use ragstore_vectorstores::{InMemoryVectorStore, ManagedVectorStore, EMA_ALPHA};
use tokio::sync::Notify;

/// Holds one search open after the engine has answered it.
struct SearchGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Delegates to an in-memory engine and counts calls.
struct CountingEngine {
    inner: InMemoryVectorStore,
    inits: AtomicUsize,
    searches: AtomicUsize,
    writes: AtomicUsize,
    closes: AtomicUsize,
    fail_search: bool,
    gate: Mutex<Option<SearchGate>>,
}

impl CountingEngine {
    fn new(config: VectorStoreConfig) -> Self {
        Self {
            inner: InMemoryVectorStore::new(config),
            inits: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_search: false,
            gate: Mutex::new(None),
        }
    }

    fn failing(config: VectorStoreConfig) -> Self {
        Self {
            fail_search: true,
            ..Self::new(config)
        }
    }
}

#[async_trait]
impl VectorStore for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    async fn initialize(&self) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(RetrievalError::Storage("disk on fire".into()));
        }
        let results = self.inner.search(query, options).await?;
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(results)
    }

    async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.add_vectors(records).await
    }

    async fn remove_vectors(&self, ids: &[String]) -> Result<()> {
        self.inner.remove_vectors(ids).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        self.inner.dimension().await
    }

    async fn get_vector(&self, id: &str) -> Result<Option<VectorRecord>> {
        self.inner.get_vector(id).await
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn managed_with(
    config: VectorStoreConfig,
    performance: PerformanceConfig,
) -> (Arc<CountingEngine>, ManagedVectorStore) {
    let engine = Arc::new(CountingEngine::new(config.clone()));
    let store = ManagedVectorStore::new(engine.clone(), config, performance);
    (engine, store)
}

fn managed() -> (Arc<CountingEngine>, ManagedVectorStore) {
    managed_with(VectorStoreConfig::default(), PerformanceProfile::Balanced.config())
}

fn record(id: &str, embedding: Vec<f32>) -> VectorRecord {
    VectorRecord::new(id, format!("doc {id}"), embedding)
}

fn ids(results: &[VectorSearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn initializes_once_lazily() {
    let (engine, store) = managed();
    assert!(!store.is_initialized());

    store.stats().await.unwrap();
    store.stats().await.unwrap();
    store.initialize().await.unwrap();
    assert_eq!(engine.inits.load(Ordering::SeqCst), 1);
    assert!(store.is_initialized());
}

#[tokio::test]
async fn top_two_by_cosine() {
    let (_, store) = managed();
    store
        .add_vectors(vec![
            record("a", vec![1.0, 0.0, 0.0, 0.0]),
            record("b", vec![0.0, 1.0, 0.0, 0.0]),
            record("c", vec![1.0, 0.0, 0.0, 0.001]),
        ])
        .await
        .unwrap();

    let results = store
        .search(&[1.0, 0.0, 0.0, 0.0], &SearchOptions::new().with_top_k(2))
        .await
        .unwrap();
    assert_eq!(ids(&results), vec!["a", "c"]);
}

#[tokio::test]
async fn metadata_filter() {
    let (_, store) = managed();
    store
        .add_vectors(vec![
            record("first", vec![1.0, 0.0]).with_metadata("kb", "kb1"),
            record("second", vec![1.0, 0.0]).with_metadata("kb", "kb2"),
        ])
        .await
        .unwrap();

    let results = store
        .search(&[1.0, 0.0], &SearchOptions::new().with_filter("kb", "kb1"))
        .await
        .unwrap();
    assert_eq!(ids(&results), vec!["first"]);
}

#[tokio::test]
async fn empty_batch_is_noop() {
    let (engine, store) = managed();
    store.add_vectors(Vec::new()).await.unwrap();
    assert_eq!(engine.writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.stats().await.unwrap().total_vectors, 0);
}

#[tokio::test]
async fn nan_rejected_before_write() {
    let (engine, store) = managed();
    let err = store
        .add_vectors(vec![
            record("ok", vec![1.0, 2.0]),
            record("bad", vec![f32::NAN, 0.0]),
        ])
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(engine.writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.stats().await.unwrap().total_vectors, 0);
}

#[tokio::test]
async fn remove_half_of_thousand() {
    let (_, store) = managed();
    let records: Vec<VectorRecord> = (0..1000)
        .map(|i| record(&format!("r{i}"), vec![i as f32, 1.0, 0.5]))
        .collect();
    store.add_vectors(records).await.unwrap();

    let doomed: Vec<String> = (0..500).map(|i| format!("r{i}")).collect();
    store.remove_vectors(&doomed).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_vectors, 500);
    assert_eq!(stats.dimension, 3);
    assert!(store.get_vector("r10").await.unwrap().is_none());
    assert!(store.get_vector("r700").await.unwrap().is_some());
}

#[tokio::test]
async fn batch_validation_errors() {
    let (_, store) = managed();

    let dup = store
        .add_vectors(vec![record("x", vec![1.0]), record("x", vec![2.0])])
        .await
        .unwrap_err();
    assert!(matches!(dup, RetrievalError::Validation(_)));

    let empty_id = store.add_vectors(vec![record("", vec![1.0])]).await.unwrap_err();
    assert!(matches!(empty_id, RetrievalError::Validation(_)));

    let ragged = store
        .add_vectors(vec![record("a", vec![1.0, 2.0]), record("b", vec![1.0])])
        .await
        .unwrap_err();
    assert!(matches!(ragged, RetrievalError::DimensionMismatch { expected: 2, actual: 1 }));

    let empty = store.add_vectors(vec![record("e", vec![])]).await.unwrap_err();
    assert!(matches!(empty, RetrievalError::InvalidVector(_)));
}

#[tokio::test]
async fn established_dimension_is_enforced() {
    let (_, store) = managed();
    store.add_vectors(vec![record("a", vec![1.0, 0.0, 0.0])]).await.unwrap();

    let err = store
        .add_vectors(vec![record("b", vec![1.0, 0.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::DimensionMismatch { expected: 3, actual: 2 }));
    assert_eq!(store.stats().await.unwrap().total_vectors, 1);

    let query_err = store
        .search(&[1.0, 0.0], &SearchOptions::new())
        .await
        .unwrap_err();
    assert!(query_err.is_validation());
}

#[tokio::test]
async fn pinned_dimension_applies_to_empty_store() {
    let config = VectorStoreConfig {
        dimension: Some(4),
        ..VectorStoreConfig::default()
    };
    let (_, store) = managed_with(config, PerformanceProfile::Balanced.config());
    assert_eq!(store.dimension().await.unwrap(), Some(4));
    let err = store.add_vectors(vec![record("a", vec![1.0])]).await.unwrap_err();
    assert!(matches!(err, RetrievalError::DimensionMismatch { expected: 4, actual: 1 }));
}

#[tokio::test]
async fn empty_or_non_finite_query_rejected() {
    let (engine, store) = managed();
    assert!(store.search(&[], &SearchOptions::new()).await.unwrap_err().is_validation());
    assert!(store
        .search(&[f32::INFINITY], &SearchOptions::new())
        .await
        .unwrap_err()
        .is_validation());
    assert_eq!(engine.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_hit_skips_engine_and_mutation_invalidates() {
    let (engine, store) = managed();
    store.add_vectors(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
    let options = SearchOptions::new().with_top_k(5);

    let first = store.search(&[1.0, 0.0], &options).await.unwrap();
    let second = store.search(&[1.0, 0.0], &options).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.searches.load(Ordering::SeqCst), 1);
    assert_eq!(store.cached_queries(), 1);

    store.add_vectors(vec![record("b", vec![0.9, 0.1])]).await.unwrap();
    assert_eq!(store.cached_queries(), 0);
    let third = store.search(&[1.0, 0.0], &options).await.unwrap();
    assert_eq!(engine.searches.load(Ordering::SeqCst), 2);
    assert_eq!(ids(&third), vec!["a", "b"]);

    store.remove_vectors(&["b".to_string()]).await.unwrap();
    let fourth = store.search(&[1.0, 0.0], &options).await.unwrap();
    assert_eq!(ids(&fourth), vec!["a"]);
    assert_eq!(engine.searches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn write_during_search_keeps_stale_result_out_of_cache() {
    let (engine, store) = managed();
    store.add_vectors(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    *engine.gate.lock().unwrap() = Some(SearchGate {
        entered: entered.clone(),
        release: release.clone(),
    });
    let options = SearchOptions::new().with_top_k(5);

    let (stale, written) = tokio::join!(store.search(&[1.0, 0.0], &options), async {
        entered.notified().await;
        let written = store.add_vectors(vec![record("b", vec![0.9, 0.1])]).await;
        release.notify_one();
        written
    });
    written.unwrap();
    assert_eq!(ids(&stale.unwrap()), vec!["a"]);
    assert_eq!(store.cached_queries(), 0);

    let fresh = store.search(&[1.0, 0.0], &options).await.unwrap();
    assert_eq!(ids(&fresh), vec!["a", "b"]);
    assert_eq!(engine.searches.load(Ordering::SeqCst), 2);
    assert_eq!(store.cached_queries(), 1);
}

#[tokio::test]
async fn different_options_do_not_share_cache_entries() {
    let (engine, store) = managed();
    store.add_vectors(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
    store.search(&[1.0, 0.0], &SearchOptions::new().with_top_k(1)).await.unwrap();
    store.search(&[1.0, 0.0], &SearchOptions::new().with_top_k(2)).await.unwrap();
    // Differs only past the tenth component.
    let long_a: Vec<f32> = (0..12).map(|i| if i == 11 { 1.0 } else { 0.0 }).collect();
    let long_b: Vec<f32> = (0..12).map(|i| if i == 11 { 2.0 } else { 0.0 }).collect();
    let (engine2, store2) = managed();
    store2.add_vectors(vec![record("z", long_a.clone())]).await.unwrap();
    store2.search(&long_a, &SearchOptions::new()).await.unwrap();
    store2.search(&long_b, &SearchOptions::new()).await.unwrap();

    assert_eq!(engine.searches.load(Ordering::SeqCst), 2);
    assert_eq!(engine2.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn memory_optimized_profile_has_no_cache() {
    let (engine, store) = managed_with(
        VectorStoreConfig::default(),
        PerformanceProfile::MemoryOptimized.config(),
    );
    store.add_vectors(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
    store.search(&[1.0, 0.0], &SearchOptions::new()).await.unwrap();
    store.search(&[1.0, 0.0], &SearchOptions::new()).await.unwrap();
    assert_eq!(engine.searches.load(Ordering::SeqCst), 2);
    assert_eq!(store.cached_queries(), 0);
}

#[tokio::test]
async fn similarity_floor_applies_to_cosine_only() {
    let (_, store) = managed();
    store
        .add_vectors(vec![
            record("same", vec![1.0, 0.0]),
            record("orthogonal", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    // Default floor is 0.1, which drops the orthogonal vector.
    let results = store.search(&[1.0, 0.0], &SearchOptions::new()).await.unwrap();
    assert_eq!(ids(&results), vec!["same"]);

    let config = VectorStoreConfig {
        similarity_metric: "euclidean".into(),
        ..VectorStoreConfig::default()
    };
    let (_, distance_store) = managed_with(config, PerformanceProfile::Balanced.config());
    distance_store
        .add_vectors(vec![record("same", vec![1.0, 0.0]), record("far", vec![5.0, 5.0])])
        .await
        .unwrap();
    let results = distance_store
        .search(&[1.0, 0.0], &SearchOptions::new())
        .await
        .unwrap();
    assert_eq!(ids(&results), vec!["same", "far"]);
    assert!(results[0].score <= results[1].score);
}

#[tokio::test]
async fn explicit_threshold_respected() {
    let (_, store) = managed();
    store
        .add_vectors(vec![
            record("a", vec![1.0, 0.0]),
            record("b", vec![1.0, 1.0]),
            record("c", vec![0.2, 1.0]),
        ])
        .await
        .unwrap();
    let results = store
        .search(&[1.0, 0.0], &SearchOptions::new().with_threshold(0.5))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.score >= 0.5));
    assert_eq!(ids(&results), vec!["a", "b"]);
}

#[tokio::test]
async fn top_k_clamped_by_max_candidates() {
    let mut config = VectorStoreConfig::default();
    config.query_optimization.max_candidates = 3;
    config.query_optimization.similarity_threshold = 0.0;
    let (_, store) = managed_with(config, PerformanceProfile::Balanced.config());
    let records = (0..10).map(|i| record(&format!("v{i}"), vec![1.0, i as f32])).collect();
    store.add_vectors(records).await.unwrap();

    let results = store
        .search(&[1.0, 0.0], &SearchOptions::new().with_top_k(8))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn results_are_sorted_and_unique() {
    let (_, store) = managed();
    let records = (0..50)
        .map(|i| record(&format!("v{i}"), vec![1.0, (i as f32) / 10.0, 0.3]))
        .collect();
    store.add_vectors(records).await.unwrap();

    let results = store
        .search(&[1.0, 0.5, 0.3], &SearchOptions::new().with_top_k(7))
        .await
        .unwrap();
    assert_eq!(results.len(), 7);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    let mut seen: Vec<&str> = ids(&results);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 7);
}

#[tokio::test]
async fn batches_split_by_batch_size() {
    let config = VectorStoreConfig {
        batch_size: 10,
        ..VectorStoreConfig::default()
    };
    let (engine, store) = managed_with(config, PerformanceProfile::Balanced.config());
    let records = (0..25).map(|i| record(&format!("v{i}"), vec![1.0, i as f32])).collect();
    store.add_vectors(records).await.unwrap();
    assert_eq!(engine.writes.load(Ordering::SeqCst), 3);
    assert_eq!(store.stats().await.unwrap().total_vectors, 25);
}

#[tokio::test]
async fn parallel_batches_when_enabled() {
    let config = VectorStoreConfig {
        batch_size: 4,
        indexing_concurrency: 3,
        ..VectorStoreConfig::default()
    };
    let (engine, store) = managed_with(config, PerformanceProfile::Performance.config());
    let records = (0..20).map(|i| record(&format!("v{i}"), vec![1.0, i as f32])).collect();
    store.add_vectors(records).await.unwrap();
    assert_eq!(engine.writes.load(Ordering::SeqCst), 5);
    assert_eq!(store.stats().await.unwrap().total_vectors, 20);
}

#[tokio::test]
async fn engine_errors_are_wrapped_and_counted() {
    let config = VectorStoreConfig::default();
    let engine = Arc::new(CountingEngine::failing(config.clone()));
    let store = ManagedVectorStore::new(engine, config, PerformanceProfile::Balanced.config());

    let err = store.search(&[1.0, 0.0], &SearchOptions::new()).await.unwrap_err();
    match &err {
        RetrievalError::Operation { operation, source } => {
            assert_eq!(*operation, "search");
            assert!(matches!(**source, RetrievalError::Storage(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("disk on fire"));
    assert!((store.metrics().error_rate - EMA_ALPHA).abs() < 1e-9);
}

#[tokio::test]
async fn metrics_track_activity() {
    let (_, store) = managed();
    store.add_vectors(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
    store.search(&[1.0, 0.0], &SearchOptions::new()).await.unwrap();
    store.search(&[1.0, 0.0], &SearchOptions::new()).await.unwrap();

    let metrics = store.metrics();
    assert!(metrics.indexing_throughput > 0.0);
    assert!(metrics.memory_usage_bytes > 0.0);
    // miss then hit
    assert!((metrics.cache_hit_rate - EMA_ALPHA).abs() < 1e-9);
    assert_eq!(metrics.error_rate, 0.0);
}

#[tokio::test]
async fn close_releases_and_reopens() {
    let (engine, store) = managed();
    store.add_vectors(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
    store.close().await.unwrap();
    assert!(!store.is_initialized());
    assert_eq!(engine.closes.load(Ordering::SeqCst), 1);

    // closing twice is harmless
    store.close().await.unwrap();
    assert_eq!(engine.closes.load(Ordering::SeqCst), 1);

    store.stats().await.unwrap();
    assert_eq!(engine.inits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn benchmark_reports_run() {
    let config = VectorStoreConfig {
        similarity_metric: "euclidean".into(),
        ..VectorStoreConfig::default()
    };
    let (_, store) = managed_with(config, PerformanceProfile::Balanced.config());
    let report = store.benchmark(200, 16).await.unwrap();

    assert_eq!(report.vector_count, 200);
    assert_eq!(report.dimension, 16);
    assert_eq!(report.accuracy, 1.0);
    assert!(report.memory_used > 0);
    assert!(report.score() > 0.0);
    assert_eq!(store.stats().await.unwrap().total_vectors, 200);
    let sample = store.get_vector("test_7").await.unwrap().unwrap();
    assert_eq!(sample.metadata["type"], "test");
    assert!(sample.embedding.iter().all(|x| (-1.0..1.0).contains(x)));
}

#[tokio::test]
async fn rerank_runs_only_when_enabled_and_requested() {
    let mut config = VectorStoreConfig::default();
    config.query_optimization.enable_reranking = true;
    let (_, store) = managed_with(config, PerformanceProfile::Balanced.config());
    store
        .add_vectors(vec![record("a", vec![1.0, 0.0]), record("b", vec![1.0, 0.5])])
        .await
        .unwrap();
    let results = store
        .search(&[1.0, 0.0], &SearchOptions::new().with_rerank().with_top_k(1))
        .await
        .unwrap();
    assert_eq!(ids(&results), vec!["a"]);
}
