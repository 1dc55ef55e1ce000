use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, RetrievalError};

pub const COSINE: &str = "cosine";
pub const EUCLIDEAN: &str = "euclidean";
pub const MANHATTAN: &str = "manhattan";
pub const DOT: &str = "dot";

/// Which way a metric's score improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

impl MetricDirection {
    /// Ordering that puts the better of two scores first.
    pub fn compare(self, a: f32, b: f32) -> std::cmp::Ordering {
        let ord = a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
        match self {
            Self::HigherIsBetter => ord.reverse(),
            Self::LowerIsBetter => ord,
        }
    }

    /// Whether `score` passes `threshold` in this direction.
    pub fn passes(self, score: f32, threshold: f32) -> bool {
        match self {
            Self::HigherIsBetter => score >= threshold,
            Self::LowerIsBetter => score <= threshold,
        }
    }

    pub fn sort<T>(self, items: &mut [T], score: impl Fn(&T) -> f32) {
        items.sort_by(|a, b| self.compare(score(a), score(b)));
    }
}

/// A named similarity or distance function over equal-length vectors.
pub trait SimilarityMetric: Send + Sync {
    /// Score two vectors already known to be valid and of equal length.
    fn calculate(&self, a: &[f32], b: &[f32]) -> f32;

    fn direction(&self) -> MetricDirection {
        MetricDirection::HigherIsBetter
    }
}

struct Cosine;

impl SimilarityMetric for Cosine {
    fn calculate(&self, a: &[f32], b: &[f32]) -> f32 {
        let norm_a = l2_norm(a);
        let norm_b = l2_norm(b);
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot(a, b) / (norm_a * norm_b)
    }
}

struct Euclidean;

impl SimilarityMetric for Euclidean {
    fn calculate(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    fn direction(&self) -> MetricDirection {
        MetricDirection::LowerIsBetter
    }
}

struct Manhattan;

impl SimilarityMetric for Manhattan {
    fn calculate(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }

    fn direction(&self) -> MetricDirection {
        MetricDirection::LowerIsBetter
    }
}

struct Dot;

impl SimilarityMetric for Dot {
    fn calculate(&self, a: &[f32], b: &[f32]) -> f32 {
        dot(a, b)
    }
}

/// Closure-backed metric for [`SimilarityCalculator::register_fn`].
struct FnMetric<F> {
    f: F,
    direction: MetricDirection,
}

impl<F> SimilarityMetric for FnMetric<F>
where
    F: Fn(&[f32], &[f32]) -> f32 + Send + Sync,
{
    fn calculate(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.f)(a, b)
    }

    fn direction(&self) -> MetricDirection {
        self.direction
    }
}

/// A candidate for [`SimilarityCalculator::find_top_k`].
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Option<Value>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: None,
        }
    }
}

/// A scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub id: String,
    pub score: f32,
    pub metadata: Option<Value>,
}

/// Registry of similarity metrics.
///
/// Constructed once (with the four built-ins) and shared by reference between
/// the components that score vectors. Custom metrics registered on one
/// instance are invisible to every other instance.
#[derive(Clone)]
pub struct SimilarityCalculator {
    metrics: HashMap<String, Arc<dyn SimilarityMetric>>,
}

impl fmt::Debug for SimilarityCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityCalculator")
            .field("metrics", &self.available_metrics())
            .finish()
    }
}

impl Default for SimilarityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityCalculator {
    pub fn new() -> Self {
        let mut calc = Self {
            metrics: HashMap::new(),
        };
        calc.register_metric(COSINE, Cosine);
        calc.register_metric(EUCLIDEAN, Euclidean);
        calc.register_metric(MANHATTAN, Manhattan);
        calc.register_metric(DOT, Dot);
        // Name used by stored configurations.
        calc.register_metric("dot_product", Dot);
        calc
    }

    /// Add or replace a metric under `name`.
    pub fn register_metric(&mut self, name: impl Into<String>, metric: impl SimilarityMetric + 'static) {
        self.metrics.insert(name.into(), Arc::new(metric));
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, direction: MetricDirection, f: F)
    where
        F: Fn(&[f32], &[f32]) -> f32 + Send + Sync + 'static,
    {
        self.register_metric(name, FnMetric { f, direction });
    }

    pub fn metric(&self, name: &str) -> Result<Arc<dyn SimilarityMetric>> {
        self.metrics
            .get(name)
            .cloned()
            .ok_or_else(|| RetrievalError::Config(format!("unknown similarity metric: {name}")))
    }

    pub fn direction_of(&self, name: &str) -> Result<MetricDirection> {
        Ok(self.metric(name)?.direction())
    }

    pub fn available_metrics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validated score of `a` against `b` under `metric`.
    pub fn calculate(&self, a: &[f32], b: &[f32], metric: &str) -> Result<f32> {
        validate_pair(a, b)?;
        Ok(self.metric(metric)?.calculate(a, b))
    }

    pub fn batch_calculate(&self, query: &[f32], candidates: &[Vec<f32>], metric: &str) -> Result<Vec<f32>> {
        candidates
            .iter()
            .map(|candidate| self.calculate(query, candidate, metric))
            .collect()
    }

    /// Best `k` candidates in the metric's improving direction.
    ///
    /// With a threshold, distance metrics keep `score <= threshold` and
    /// similarity metrics keep `score >= threshold`.
    pub fn find_top_k(
        &self,
        query: &[f32],
        candidates: &[Candidate],
        k: usize,
        metric: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredCandidate>> {
        let direction = self.direction_of(metric)?;
        let mut scored = candidates
            .iter()
            .map(|c| {
                Ok(ScoredCandidate {
                    id: c.id.clone(),
                    score: self.calculate(query, &c.vector, metric)?,
                    metadata: c.metadata.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        direction.sort(&mut scored, |c| c.score);
        if let Some(t) = threshold {
            scored.retain(|c| direction.passes(c.score, t));
        }
        scored.truncate(k);
        Ok(scored)
    }
}

/// Reject empty, mismatched, or non-finite vectors.
pub fn validate_pair(a: &[f32], b: &[f32]) -> Result<()> {
    if a.is_empty() || b.is_empty() {
        return Err(RetrievalError::InvalidVector("vector must not be empty".into()));
    }
    if a.len() != b.len() {
        return Err(RetrievalError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    if !all_finite(a) || !all_finite(b) {
        return Err(RetrievalError::InvalidVector("vector contains non-finite values".into()));
    }
    Ok(())
}

pub fn all_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn l1_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x.abs()).sum()
}

/// Unit-length copy of `v`; a zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Cosine similarity with a precomputed norm for `b`.
pub fn cosine_with_norm(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}
