use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragstore_config::VectorStoreConfig;
use ragstore_core::text::{keyword_score, query_terms};
use ragstore_core::{
    matches_filter, Result, RetrievalError, SearchOptions, SimilarityCalculator, StoreStats,
    VectorRecord, VectorSearchResult, VectorStore,
};
use tokio::sync::RwLock;

/// Stored record plus soft-delete and recency bookkeeping.
struct StoredEntry {
    record: VectorRecord,
    /// Insertion order, for recency prefiltering.
    seq: u64,
    created_at: i64,
    deleted: bool,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, StoredEntry>,
    dimension: Option<usize>,
    next_seq: u64,
}

/// Process-local engine with the same semantics as the SQLite engine:
/// upserts, soft deletes, a dimension fixed by the first write, and
/// recency-bounded candidates when prefiltering is on.
pub struct InMemoryVectorStore {
    state: RwLock<State>,
    config: VectorStoreConfig,
    calculator: Arc<SimilarityCalculator>,
}

impl InMemoryVectorStore {
    pub fn new(config: VectorStoreConfig) -> Self {
        Self::with_calculator(config, Arc::new(SimilarityCalculator::new()))
    }

    pub fn with_calculator(config: VectorStoreConfig, calculator: Arc<SimilarityCalculator>) -> Self {
        let state = State {
            dimension: config.dimension,
            ..State::default()
        };
        Self {
            state: RwLock::new(state),
            config,
            calculator,
        }
    }

    /// Soft-deleted records still held in memory.
    pub async fn deleted_count(&self) -> usize {
        self.state
            .read()
            .await
            .entries
            .values()
            .filter(|e| e.deleted)
            .count()
    }

    fn to_result(entry: &StoredEntry, score: f32, with_embedding: bool) -> VectorSearchResult {
        VectorSearchResult {
            id: entry.record.id.clone(),
            content: entry.record.content.clone(),
            score,
            metadata: entry.record.metadata.clone(),
            embedding: with_embedding.then(|| entry.record.embedding.clone()),
        }
    }
}

/// Live entries that pass the filter and exclusions, newest first.
fn candidates<'a>(state: &'a State, options: &SearchOptions) -> Vec<&'a StoredEntry> {
    let mut live: Vec<&StoredEntry> = state
        .entries
        .values()
        .filter(|e| !e.deleted)
        .filter(|e| !options.exclude_ids.contains(&e.record.id))
        .filter(|e| matches_filter(&e.record.metadata, &options.filter))
        .collect();
    live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq)));
    live
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        let metric = self.calculator.metric(&self.config.similarity_metric)?;
        let direction = metric.direction();
        let state = self.state.read().await;

        let mut pool = candidates(&state, options);
        pool.retain(|e| e.record.embedding.len() == query.len());
        let q = &self.config.query_optimization;
        if q.enable_prefiltering {
            pool.truncate(q.max_candidates);
        }

        let mut scored: Vec<(&StoredEntry, f32)> = pool
            .into_iter()
            .map(|e| (e, metric.calculate(query, &e.record.embedding)))
            .collect();
        direction.sort(&mut scored, |(_, score)| *score);
        if let Some(t) = options.threshold {
            scored.retain(|(_, score)| direction.passes(*score, t));
        }
        scored.truncate(options.top_k_or_default());

        Ok(scored
            .into_iter()
            .map(|(e, score)| Self::to_result(e, score, options.include_embeddings))
            .collect())
    }

    async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let expected = state
            .dimension
            .or_else(|| records.first().map(VectorRecord::dimension));
        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.dimension() != expected) {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: bad.dimension(),
                });
            }
        }

        let now = chrono::Utc::now().timestamp();
        for record in records {
            let seq = state.next_seq;
            match state.entries.get_mut(&record.id) {
                Some(existing) => {
                    existing.record = record;
                    existing.deleted = false;
                }
                None => {
                    state.next_seq += 1;
                    state.entries.insert(
                        record.id.clone(),
                        StoredEntry {
                            record,
                            seq,
                            created_at: now,
                            deleted: false,
                        },
                    );
                }
            }
        }
        if state.dimension.is_none() {
            state.dimension = expected;
        }
        Ok(())
    }

    async fn remove_vectors(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        for id in ids {
            if let Some(entry) = state.entries.get_mut(id) {
                entry.deleted = true;
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.state.write().await.entries.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read().await;
        let live = state.entries.values().filter(|e| !e.deleted);
        let (total, bytes) = live.fold((0usize, 0u64), |(n, b), e| {
            let size = e.record.embedding.len() * 4 + e.record.content.len() + e.record.id.len();
            (n + 1, b + size as u64)
        });
        Ok(StoreStats {
            total_vectors: total,
            dimension: state.dimension.unwrap_or(0),
            index_size: bytes,
        })
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().await.dimension)
    }

    async fn get_vector(&self, id: &str) -> Result<Option<VectorRecord>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .get(id)
            .filter(|e| !e.deleted)
            .map(|e| e.record.clone()))
    }

    async fn text_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        let mut scored: Vec<(&StoredEntry, f32)> = candidates(&state, options)
            .into_iter()
            .map(|e| (e, keyword_score(&terms, &e.record.content)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        // Stable: equal scores stay newest first.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.top_k_or_default());

        Ok(scored
            .into_iter()
            .map(|(e, score)| Self::to_result(e, score, options.include_embeddings))
            .collect())
    }

    /// Purge soft-deleted entries.
    async fn optimize(&self) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.deleted);
        Ok(state.entries.len() != before)
    }
}
