use async_trait::async_trait;
use ragstore_core::{MetricDirection, Result, VectorSearchResult};

/// Second ordering pass over results the engine already ranked.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &[f32],
        results: Vec<VectorSearchResult>,
        direction: MetricDirection,
    ) -> Result<Vec<VectorSearchResult>>;
}

/// Re-sorts by score in the metric's improving direction. Stable, so ties keep engine order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreReranker;

#[async_trait]
impl Reranker for ScoreReranker {
    async fn rerank(
        &self,
        _query: &[f32],
        mut results: Vec<VectorSearchResult>,
        direction: MetricDirection,
    ) -> Result<Vec<VectorSearchResult>> {
        direction.sort(&mut results, |r| r.score);
        Ok(results)
    }
}
