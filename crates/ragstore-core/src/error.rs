use thiserror::Error;

/// Result alias used across all ragstore crates.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Every failure the retrieval engine can surface.
///
/// Variants fall into three groups:
/// - validation (`InvalidVector`, `DimensionMismatch`, `Validation`): caller
///   input is wrong, never retried, never reaches storage;
/// - transient storage (`Busy`): lock/busy/timeout that survived the retry policy;
/// - fatal storage (`Storage`, `Corrupt`, `Unsupported`, `Config`): surfaced at once.
///
/// [`RetrievalError::Operation`] is the envelope the managed store puts around
/// anything an engine returns, so callers always see which public operation failed.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{operation} still busy after {attempts} attempts: {message}")]
    Busy {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<RetrievalError>,
    },
}

impl RetrievalError {
    /// Wrap an engine error with the name of the public operation that hit it.
    pub fn in_operation(operation: &'static str, source: RetrievalError) -> Self {
        Self::Operation {
            operation,
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping any `Operation` envelopes.
    pub fn root(&self) -> &RetrievalError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidVector(_) | Self::DimensionMismatch { .. } | Self::Validation(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::Busy { .. })
    }
}
