use std::future::Future;
use std::time::Duration;

use rand::Rng;
use ragstore_core::{Result, RetrievalError};
use tracing::warn;

/// Retries database calls that fail on lock contention.
///
/// Delay before attempt `n + 1` is `base_delay * 2^(n - 1)` plus up to
/// `max_jitter` of random jitter. Errors that are not transient are
/// returned at once; transient errors that outlast every attempt become
/// [`RetrievalError::Busy`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RetryPolicy {
    /// At least one attempt, 100ms base delay and up to 100ms jitter.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the `attempt`-th failure (1-based), without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        self.base_delay_for(attempt) + jitter
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_transient(&e) => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetrievalError::Busy {
                        operation: operation.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "database busy, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Lock, busy and timeout failures, which are worth another attempt.
pub fn is_transient(error: &RetrievalError) -> bool {
    match error.root() {
        RetrievalError::Storage(message) => is_transient_message(message),
        _ => false,
    }
}

/// Matches the markers SQLite and [`sqlite_error`] put on contention failures only.
pub fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["database is locked", "database busy", "timeout"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Map a SQLite error, tagging busy/locked result codes so they classify as transient.
pub(crate) fn sqlite_error(context: &str, error: rusqlite::Error) -> RetrievalError {
    use rusqlite::ErrorCode;
    match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            RetrievalError::Storage(format!("{context}: database busy: {error}"))
        }
        _ => RetrievalError::Storage(format!("{context}: {error}")),
    }
}
