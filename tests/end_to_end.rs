use std::sync::Arc;

use ragstore::config::{PerformanceProfile, UseCase};
use ragstore::core::RetrievalError;
use ragstore::retrieval::HybridSearchOptions;
use ragstore::{
    init_tracing, RetrievalService, SearchOptions, TracingOptions, VectorRecord,
    VectorStoreCreationOptions, VectorStoreFactory,
};
use serde_json::json;

fn chat_records() -> Vec<VectorRecord> {
    vec![
        VectorRecord::new("m1", "how do I reset my password", vec![0.9, 0.1, 0.0])
            .with_metadata("conversation", "c1")
            .with_metadata("role", "user"),
        VectorRecord::new("m2", "open settings and choose reset password", vec![0.8, 0.2, 0.1])
            .with_metadata("conversation", "c1")
            .with_metadata("role", "assistant"),
        VectorRecord::new("m3", "what is the weather tomorrow", vec![0.0, 0.2, 0.9])
            .with_metadata("conversation", "c2")
            .with_metadata("role", "user"),
    ]
}

#[tokio::test]
async fn chat_history_round_trip() {
    let _ = init_tracing(&TracingOptions {
        filter: Some("ragstore=debug".to_string()),
        json: false,
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let options = VectorStoreCreationOptions::default()
        .with_use_case(UseCase::Chat)
        .with_profile(PerformanceProfile::Balanced)
        .with_overrides(json!({ "sqlite": { "path": path.to_string_lossy() } }));
    let service = RetrievalService::new(Arc::new(VectorStoreFactory::default()), options.clone());

    service.add_vectors(chat_records()).await.unwrap();

    let results = service
        .search(
            &[1.0, 0.1, 0.0],
            &SearchOptions::new()
                .with_top_k(5)
                .with_filter("conversation", json!("c1")),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "m1");
    assert!(results.iter().all(|r| r.metadata["conversation"] == json!("c1")));

    let hybrid = service
        .hybrid_search(
            &[1.0, 0.1, 0.0],
            "reset password",
            &HybridSearchOptions::new(SearchOptions::new().with_top_k(2)),
        )
        .await
        .unwrap();
    assert_eq!(hybrid.len(), 2);
    assert!(hybrid.iter().all(|r| r.id != "m3"));

    service.close().await.unwrap();

    let reopened = RetrievalService::new(Arc::new(VectorStoreFactory::default()), options);
    let stats = reopened.get_stats().await.unwrap();
    assert_eq!(stats.total_vectors, 3);
    assert_eq!(stats.dimension, 3);

    let err = reopened
        .add_vectors(vec![VectorRecord::new("bad", "wrong size", vec![1.0, 0.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::DimensionMismatch { expected: 3, actual: 2 }));
    reopened.close().await.unwrap();
}

#[test]
fn tracing_init_is_not_repeatable() {
    let bad = init_tracing(&TracingOptions {
        filter: Some("ragstore=[".to_string()),
        json: false,
    });
    if std::env::var("RUST_LOG").is_err() {
        assert!(matches!(bad, Err(RetrievalError::Config(_))));
    }

    let _ = init_tracing(&TracingOptions::default());
    let again = init_tracing(&TracingOptions {
        filter: None,
        json: true,
    });
    assert!(matches!(again, Err(RetrievalError::Config(_))));
}
