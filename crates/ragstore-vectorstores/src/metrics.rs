use serde::{Deserialize, Serialize};

/// Smoothing factor for every tracked metric.
pub const EMA_ALPHA: f64 = 0.1;

/// Exponential moving averages of a store's behavior.
///
/// All fields start at 0 and move 10% of the way toward each new sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub search_latency_ms: f64,
    /// Vectors written per second.
    pub indexing_throughput: f64,
    pub memory_usage_bytes: f64,
    /// 1 for a cache hit, 0 for a miss. Only sampled while the query cache is on.
    pub cache_hit_rate: f64,
    /// 1 for a failed operation, 0 for a successful one.
    pub error_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    SearchLatency,
    IndexingThroughput,
    MemoryUsage,
    CacheHitRate,
    ErrorRate,
}

impl StoreMetrics {
    pub fn record(&mut self, metric: Metric, sample: f64) {
        let slot = match metric {
            Metric::SearchLatency => &mut self.search_latency_ms,
            Metric::IndexingThroughput => &mut self.indexing_throughput,
            Metric::MemoryUsage => &mut self.memory_usage_bytes,
            Metric::CacheHitRate => &mut self.cache_hit_rate,
            Metric::ErrorRate => &mut self.error_rate,
        };
        *slot = *slot * (1.0 - EMA_ALPHA) + sample * EMA_ALPHA;
    }
}
