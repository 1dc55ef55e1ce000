use rand::Rng;
use ragstore_core::VectorRecord;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BENCHMARK_VECTORS: usize = 1000;
pub const DEFAULT_BENCHMARK_DIMENSION: usize = 384;

/// Outcome of one [`ManagedVectorStore::benchmark`](crate::ManagedVectorStore::benchmark) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreBenchmark {
    pub vector_count: usize,
    pub dimension: usize,
    pub search_time_ms: f64,
    pub indexing_time_ms: f64,
    /// `index_size` reported by the store after indexing.
    pub memory_used: u64,
    /// 1.0 if the sample search returned anything, else 0.0.
    pub accuracy: f64,
}

impl VectorStoreBenchmark {
    /// Composite score used to rank configurations; higher is better.
    ///
    /// `0.4 * 1000 / max(search_ms, 1) + 0.3 * 1e6 / max(memory, 1000) + 0.3 * accuracy * 1000`
    pub fn score(&self) -> f64 {
        let search = 1000.0 / self.search_time_ms.max(1.0);
        let memory = 1_000_000.0 / (self.memory_used as f64).max(1000.0);
        let accuracy = self.accuracy * 1000.0;
        0.4 * search + 0.3 * memory + 0.3 * accuracy
    }
}

/// `count` records with ids `test_{i}` and components uniform in [-1, 1).
pub fn generate_test_records(count: usize, dimension: usize) -> Vec<VectorRecord> {
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let embedding = (0..dimension).map(|_| rng.random_range(-1.0f32..1.0)).collect();
            VectorRecord::new(format!("test_{i}"), format!("test document {i}"), embedding)
                .with_metadata("index", i)
                .with_metadata("type", "test")
        })
        .collect()
}

pub fn random_vector(dimension: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..dimension).map(|_| rng.random_range(-1.0f32..1.0)).collect()
}
