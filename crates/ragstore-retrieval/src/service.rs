use std::sync::Arc;

use ragstore_config::UseCase;
use ragstore_core::similarity::COSINE;
use ragstore_core::{
    Candidate, Result, RetrievalError, ScoredCandidate, SearchOptions, SimilarityCalculator,
    StoreStats, VectorRecord, VectorSearchResult,
};
use ragstore_vectorstores::{ManagedVectorStore, StoreMetrics, VectorStoreBenchmark};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::factory::{StoreHandle, VectorStoreFactory};
use crate::hybrid::{combine_results, hybrid_candidates};
use crate::options::{DimensionCheck, HybridSearchOptions, VectorStoreCreationOptions};

struct ServiceState {
    options: VectorStoreCreationOptions,
    active: Option<(StoreHandle, Arc<ManagedVectorStore>)>,
}

/// Entry point for the RAG pipeline.
///
/// Holds at most one active store, built through the shared factory on first
/// use. Switching strategy releases the previous store's handle.
pub struct RetrievalService {
    factory: Arc<VectorStoreFactory>,
    state: Mutex<ServiceState>,
}

impl RetrievalService {
    pub fn new(factory: Arc<VectorStoreFactory>, options: VectorStoreCreationOptions) -> Self {
        Self {
            factory,
            state: Mutex::new(ServiceState {
                options,
                active: None,
            }),
        }
    }

    pub fn factory(&self) -> &Arc<VectorStoreFactory> {
        &self.factory
    }

    pub fn calculator(&self) -> &Arc<SimilarityCalculator> {
        self.factory.calculator()
    }

    /// The active store, created on first call.
    pub async fn store(&self) -> Result<Arc<ManagedVectorStore>> {
        let mut state = self.state.lock().await;
        if let Some((_, store)) = &state.active {
            return Ok(store.clone());
        }
        let (handle, store) = self.factory.create(&state.options)?;
        info!(?handle, backend = state.options.backend.as_str(), "retrieval service ready");
        state.active = Some((handle, store.clone()));
        Ok(store)
    }

    pub async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        self.store().await?.search(query, options).await
    }

    /// Weighted blend of vector similarity and keyword overlap.
    pub async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        options: &HybridSearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        let store = self.store().await?;
        let top_k = options.search.top_k_or_default();
        let sub = options
            .search
            .clone()
            .with_top_k(hybrid_candidates(top_k));

        let vector_results = store.search(query_embedding, &sub).await?;
        let text_results = store.text_search(query_text, &sub).await?;
        let direction = self
            .calculator()
            .direction_of(&store.config().similarity_metric)?;
        debug!(
            vector_hits = vector_results.len(),
            text_hits = text_results.len(),
            top_k,
            "hybrid search"
        );

        Ok(combine_results(
            vector_results,
            text_results,
            direction,
            options.vector_weight,
            options.text_weight,
            top_k,
        ))
    }

    pub async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.store().await?.add_vectors(records).await
    }

    pub async fn remove_vectors(&self, ids: &[String]) -> Result<()> {
        self.store().await?.remove_vectors(ids).await
    }

    pub async fn get_stats(&self) -> Result<StoreStats> {
        self.store().await?.stats().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store().await?.clear().await
    }

    /// Build the store for `options` and make it active, releasing the old one.
    pub async fn switch_strategy(&self, options: VectorStoreCreationOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        let (handle, store) = self.factory.create(&options)?;
        info!(
            ?handle,
            backend = options.backend.as_str(),
            profile = ?options.performance_profile,
            "retrieval strategy switched"
        );
        let previous = state.active.replace((handle, store));
        state.options = options;
        if let Some((previous, _)) = previous {
            self.factory.release(previous).await?;
        }
        Ok(())
    }

    pub async fn current_config(&self) -> VectorStoreCreationOptions {
        self.state.lock().await.options.clone()
    }

    pub fn recommended_config(
        vector_count: usize,
        dimension: usize,
        use_case: UseCase,
    ) -> VectorStoreCreationOptions {
        VectorStoreFactory::recommended_config(vector_count, dimension, use_case)
    }

    /// Score two vectors; `metric` defaults to cosine.
    pub fn calculate_similarity(&self, a: &[f32], b: &[f32], metric: Option<&str>) -> Result<f32> {
        self.calculator().calculate(a, b, metric.unwrap_or(COSINE))
    }

    pub fn batch_calculate_similarity(
        &self,
        query: &[f32],
        candidates: &[Vec<f32>],
        metric: Option<&str>,
    ) -> Result<Vec<f32>> {
        self.calculator()
            .batch_calculate(query, candidates, metric.unwrap_or(COSINE))
    }

    pub fn find_top_k_similar(
        &self,
        query: &[f32],
        candidates: &[Candidate],
        k: usize,
        metric: Option<&str>,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredCandidate>> {
        self.calculator()
            .find_top_k(query, candidates, k, metric.unwrap_or(COSINE), threshold)
    }

    /// Check that `vectors` is non-empty and of one dimension.
    pub fn validate_vector_dimension(&self, vectors: &[Vec<f32>]) -> DimensionCheck {
        let Some(first) = vectors.first() else {
            return DimensionCheck {
                is_valid: false,
                dimension: None,
                error: Some("no vectors given".to_string()),
            };
        };
        let expected = first.len();
        match vectors.iter().position(|v| v.len() != expected) {
            Some(i) => DimensionCheck {
                is_valid: false,
                dimension: None,
                error: Some(format!(
                    "inconsistent dimension at index {i}: expected {expected}, got {}",
                    vectors[i].len()
                )),
            },
            None => DimensionCheck {
                is_valid: true,
                dimension: Some(expected),
                error: None,
            },
        }
    }

    /// Neighbours of a stored record, excluding the record itself.
    pub async fn search_similar_documents(
        &self,
        id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        let store = self.store().await?;
        let record = store
            .get_vector(id)
            .await?
            .ok_or_else(|| RetrievalError::NotFound(format!("document {id} not found")))?;
        let options = options.clone().excluding(id);
        store.search(&record.embedding, &options).await
    }

    pub async fn get_metrics(&self) -> Result<StoreMetrics> {
        Ok(self.store().await?.metrics())
    }

    pub async fn benchmark(&self, count: usize, dimension: usize) -> Result<VectorStoreBenchmark> {
        self.store().await?.benchmark(count, dimension).await
    }

    /// Engine maintenance, then release of cached memory.
    ///
    /// Returns whether maintenance ran (it is throttled by the engine).
    pub async fn optimize(&self) -> Result<bool> {
        let store = self.store().await?;
        let ran = store.optimize().await?;
        store.compact().await?;
        Ok(ran)
    }

    /// Release the active store. A later call builds it again.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some((handle, _)) = state.active.take() {
            self.factory.release(handle).await?;
        }
        Ok(())
    }
}
