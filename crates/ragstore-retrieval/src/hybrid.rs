use std::collections::HashMap;

use ragstore_core::{MetricDirection, VectorSearchResult};

/// Candidates fetched from each side of a hybrid search for a final `top_k`.
pub fn hybrid_candidates(top_k: usize) -> usize {
    top_k.saturating_mul(2).max(20)
}

/// Merge vector and keyword hits into one weighted ranking.
///
/// Vector scores from distance metrics are mapped to `1 / (1 + d)` first so
/// both sides grow with relevance. An id found by both searches gets the sum
/// of its weighted scores; an id found by one keeps that one weighted score.
pub fn combine_results(
    vector_results: Vec<VectorSearchResult>,
    text_results: Vec<VectorSearchResult>,
    direction: MetricDirection,
    vector_weight: f32,
    text_weight: f32,
    top_k: usize,
) -> Vec<VectorSearchResult> {
    let mut merged: Vec<VectorSearchResult> = Vec::with_capacity(vector_results.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut result in vector_results {
        let similarity = match direction {
            MetricDirection::HigherIsBetter => result.score,
            MetricDirection::LowerIsBetter => 1.0 / (1.0 + result.score.max(0.0)),
        };
        result.score = similarity * vector_weight;
        index.insert(result.id.clone(), merged.len());
        merged.push(result);
    }

    for mut result in text_results {
        let weighted = result.score * text_weight;
        match index.get(&result.id) {
            Some(&i) => merged[i].score += weighted,
            None => {
                result.score = weighted;
                index.insert(result.id.clone(), merged.len());
                merged.push(result);
            }
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);
    merged
}
