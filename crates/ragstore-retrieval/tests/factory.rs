use std::sync::Arc;

use ragstore_config::{BackendType, PerformanceProfile, UseCase};
use ragstore_core::{RetrievalError, SimilarityCalculator, VectorRecord};
use ragstore_retrieval::{
    ConfigurationRequirements, SystemResources, VectorStoreCreationOptions, VectorStoreFactory,
};
use serde_json::json;

fn factory(memory_mb: usize) -> VectorStoreFactory {
    VectorStoreFactory::with_resources(
        Arc::new(SimilarityCalculator::new()),
        SystemResources {
            cpu_cores: 16,
            memory_mb,
        },
    )
}

fn scratch(table: &str) -> VectorStoreCreationOptions {
    VectorStoreCreationOptions::default()
        .with_overrides(json!({ "sqlite": { "path": ":memory:", "table_name": table } }))
}

#[tokio::test]
async fn same_key_shares_one_store() {
    let factory = factory(1024);
    let (h1, s1) = factory.create(&scratch("docs")).unwrap();
    let (h2, s2) = factory.create(&scratch("docs")).unwrap();
    assert_eq!(h1, h2);
    assert!(Arc::ptr_eq(&s1, &s2));

    let stats = factory.cache_stats();
    assert_eq!(stats.instance_count, 1);
    assert_eq!(stats.instances[0].refs, 2);
    assert_eq!(stats.instances[0].key.location, ":memory:#docs");
}

#[tokio::test]
async fn different_location_gets_its_own_store() {
    let factory = factory(1024);
    let (h1, s1) = factory.create(&scratch("docs")).unwrap();
    let (h2, s2) = factory.create(&scratch("notes")).unwrap();
    assert_ne!(h1, h2);
    assert!(!Arc::ptr_eq(&s1, &s2));

    let (h3, _) = factory
        .create(&scratch("docs").with_profile(PerformanceProfile::Performance))
        .unwrap();
    assert_ne!(h1, h3);
    assert_eq!(factory.cache_stats().instance_count, 3);
}

#[tokio::test]
async fn release_closes_at_zero() {
    let factory = factory(1024);
    let (handle, store) = factory.create(&scratch("docs")).unwrap();
    factory.create(&scratch("docs")).unwrap();
    store
        .add_vectors(vec![VectorRecord::new("a", "a", vec![1.0, 0.0])])
        .await
        .unwrap();
    assert!(store.is_initialized());

    assert!(!factory.release(handle).await.unwrap());
    assert!(factory.get(handle).is_some());
    assert!(store.is_initialized());

    assert!(factory.release(handle).await.unwrap());
    assert!(factory.get(handle).is_none());
    assert!(!store.is_initialized());
    assert_eq!(factory.cache_stats().instance_count, 0);

    assert!(!factory.release(handle).await.unwrap());
    let (fresh, _) = factory.create(&scratch("docs")).unwrap();
    assert_ne!(fresh, handle);
}

#[tokio::test]
async fn dedicated_stores_are_not_memoized() {
    let factory = factory(1024);
    let a = factory.create_dedicated(&scratch("docs")).unwrap();
    let b = factory.create_dedicated(&scratch("docs")).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(factory.cache_stats().instance_count, 0);
}

#[tokio::test]
async fn memory_backend_and_qdrant_placeholder() {
    let factory = factory(1024);
    let (_, store) = factory
        .create(&VectorStoreCreationOptions::new(BackendType::Memory))
        .unwrap();
    assert_eq!(store.engine().name(), "memory");

    let err = factory
        .create(&VectorStoreCreationOptions::new(BackendType::Qdrant))
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Unsupported(_)));
}

#[tokio::test]
async fn invalid_overrides_rejected() {
    let factory = factory(1024);
    let err = factory
        .create(&scratch("docs").with_overrides(json!({ "batch_size": 0 })))
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Config(_)));

    let err = factory
        .create(&scratch("docs").with_overrides(json!({ "batch_size": "lots" })))
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Config(_)));
}

#[test]
fn auto_tune_follows_resources() {
    let opts = scratch("docs");

    let store = factory(2048).create_dedicated(&opts).unwrap();
    assert_eq!(store.config().indexing_concurrency, 8);
    assert_eq!(store.config().cache_size, 5000);
    assert_eq!(store.performance().query_cache_size, 2000);

    let store = factory(768).create_dedicated(&opts).unwrap();
    assert_eq!(store.config().cache_size, 2000);
    assert_eq!(store.performance().query_cache_size, 1000);

    let store = factory(256).create_dedicated(&opts).unwrap();
    assert_eq!(store.config().cache_size, 1000);
    assert_eq!(
        store.performance().query_cache_size,
        PerformanceProfile::Balanced.config().query_cache_size
    );

    let single_core = VectorStoreFactory::with_resources(
        Arc::new(SimilarityCalculator::new()),
        SystemResources {
            cpu_cores: 0,
            memory_mb: 1024,
        },
    );
    let store = single_core.create_dedicated(&opts).unwrap();
    assert_eq!(store.config().indexing_concurrency, 1);

    let untuned = factory(2048)
        .create_dedicated(&opts.clone().with_auto_tune(false))
        .unwrap();
    assert_eq!(untuned.config().indexing_concurrency, 4);
}

#[test]
fn use_case_preset_then_profile() {
    let factory = factory(1024);
    let opts = scratch("docs")
        .with_use_case(UseCase::Analytics)
        .with_profile(PerformanceProfile::Performance)
        .with_auto_tune(false);
    let store = factory.create_dedicated(&opts).unwrap();
    assert_eq!(store.config().similarity_metric, "euclidean");
    assert_eq!(store.config().batch_size, 10000);
    assert_eq!(store.performance(), &PerformanceProfile::Performance.config());
}

#[test]
fn recommended_bands() {
    let rec = |n| VectorStoreFactory::recommended_config(n, 384, UseCase::Search);
    assert_eq!(rec(1_000).performance_profile, Some(PerformanceProfile::MemoryOptimized));
    assert_eq!(rec(10_000).performance_profile, Some(PerformanceProfile::Balanced));
    assert_eq!(rec(100_000).performance_profile, Some(PerformanceProfile::Performance));
    assert_eq!(rec(100_000).backend, BackendType::Sqlite);

    let huge = rec(500_000);
    assert_eq!(huge.backend, BackendType::Qdrant);
    assert_eq!(huge.performance_profile, Some(PerformanceProfile::Performance));

    let wide = VectorStoreFactory::recommended_config(150_000, 4096, UseCase::Chat);
    assert_eq!(wide.backend, BackendType::Sqlite);
    assert_eq!(wide.performance_profile, Some(PerformanceProfile::MemoryOptimized));
    assert_eq!(wide.use_case, Some(UseCase::Chat));
    assert!(wide.auto_tune);
}

#[test]
fn memory_estimate_multipliers() {
    // 1024 * 256 * 4 bytes = 1 MB raw.
    let opts = |backend, profile| {
        VectorStoreCreationOptions::new(backend).with_profile(profile)
    };
    let mb = |o: &VectorStoreCreationOptions| VectorStoreFactory::estimate_memory_mb(o, 1024, 256);
    assert!((mb(&opts(BackendType::Sqlite, PerformanceProfile::MemoryOptimized)) - 1.2).abs() < 1e-9);
    assert!((mb(&opts(BackendType::Sqlite, PerformanceProfile::Balanced)) - 1.5).abs() < 1e-9);
    assert!((mb(&opts(BackendType::Sqlite, PerformanceProfile::Performance)) - 2.0).abs() < 1e-9);
    assert!((mb(&opts(BackendType::Qdrant, PerformanceProfile::Performance)) - 2.5).abs() < 1e-9);
}

#[test]
fn best_configuration_by_budget_and_priority() {
    // 100k x 1024 dims = ~390.6 MB raw.
    let mut req = ConfigurationRequirements {
        max_vector_count: 100_000,
        dimension: 1024,
        max_memory_mb: 10_000.0,
        prioritize_speed: true,
        use_case: UseCase::Search,
    };
    let best = VectorStoreFactory::best_configuration(&req);
    assert_eq!(best.performance_profile, Some(PerformanceProfile::Performance));
    assert_eq!(best.backend, BackendType::Sqlite);

    req.prioritize_speed = false;
    let best = VectorStoreFactory::best_configuration(&req);
    assert_eq!(best.performance_profile, Some(PerformanceProfile::MemoryOptimized));

    // Fits memory_optimized (468.75) and balanced (585.9), not performance (781.25).
    req.prioritize_speed = true;
    req.max_memory_mb = 600.0;
    let best = VectorStoreFactory::best_configuration(&req);
    assert_eq!(best.performance_profile, Some(PerformanceProfile::MemoryOptimized));

    req.max_memory_mb = 1.0;
    let best = VectorStoreFactory::best_configuration(&req);
    assert_eq!(best.performance_profile, Some(PerformanceProfile::MemoryOptimized));
    assert_eq!(best.use_case, Some(UseCase::Search));
}

#[tokio::test]
async fn benchmark_ranks_and_skips_failures() {
    let factory = factory(1024);
    let configs = vec![
        VectorStoreCreationOptions::default().with_profile(PerformanceProfile::MemoryOptimized),
        VectorStoreCreationOptions::new(BackendType::Qdrant),
        VectorStoreCreationOptions::new(BackendType::Memory),
    ];
    let ranked = factory.benchmark_configurations(&configs, 50, 8).await;
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].score >= ranked[1].score);
    for entry in &ranked {
        assert_eq!(entry.benchmark.vector_count, 50);
        assert_eq!(entry.benchmark.accuracy, 1.0);
        assert_ne!(entry.options.backend, BackendType::Qdrant);
    }
    assert_eq!(factory.cache_stats().instance_count, 0);
}

#[tokio::test]
async fn clear_cache_closes_everything() {
    let factory = factory(1024);
    let (_, a) = factory.create(&scratch("one")).unwrap();
    factory.create(&scratch("two")).unwrap();
    a.add_vectors(vec![VectorRecord::new("x", "x", vec![1.0])])
        .await
        .unwrap();

    assert_eq!(factory.clear_cache().await.unwrap(), 2);
    assert_eq!(factory.cache_stats().instance_count, 0);
    assert!(!a.is_initialized());
}

#[tokio::test]
async fn conflicting_settings_on_one_table_rejected() {
    let factory = factory(1024);
    let (handle, store) = factory.create(&scratch("docs")).unwrap();

    let err = factory
        .create(&scratch("docs").with_overrides(json!({
            "similarity_metric": "euclidean",
            "dimension": 8,
            "sqlite": { "path": ":memory:", "table_name": "docs" }
        })))
        .unwrap_err();
    match err {
        RetrievalError::Config(msg) => {
            assert!(msg.contains(":memory:#docs"));
            assert!(msg.contains("similarity_metric cosine vs euclidean"));
            assert!(msg.contains("dimension"));
        }
        other => panic!("expected Config, got {other:?}"),
    }

    assert_eq!(store.config().similarity_metric, "cosine");
    let stats = factory.cache_stats();
    assert_eq!(stats.instance_count, 1);
    assert_eq!(stats.instances[0].refs, 1);
    assert!(factory.release(handle).await.unwrap());
}
