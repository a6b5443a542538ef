//! Retry utilities for contract submissions
//!
//! Exponential backoff for transport failures; business rejections from the
//! contract are final and returned to the caller untouched.

use std::future::Future;
use std::time::Duration;

use eyre::Result;
use tracing::{debug, warn};

use crate::contract_client::is_rejection;

/// Submission retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Calculate backoff duration after a failed attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network or node trouble, worth another attempt
    Transient,
    /// The contract refused the message
    Rejected,
    /// Anything else, retried with backoff
    Unknown,
}

/// Classify an error for retry decisions
pub fn classify_error(error: &eyre::Report) -> ErrorClass {
    if is_rejection(error) {
        return ErrorClass::Rejected;
    }

    let error_lower = format!("{:#}", error).to_lowercase();
    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}

/// Execute with retry logic.
///
/// The closure receives the 0-indexed attempt number.
pub async fn with_retry<F, T, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                let class = classify_error(&e);

                if class == ErrorClass::Rejected {
                    debug!(label, error = %e, "Rejected, not retrying");
                    return Err(e);
                }

                if !config.should_retry(attempt) {
                    warn!(
                        label,
                        attempts = attempt,
                        error = %e,
                        "Giving up after exhausting retries"
                    );
                    return Err(e);
                }

                let backoff = config.backoff_for_attempt(attempt - 1);
                warn!(
                    label,
                    attempt,
                    max = config.max_attempts,
                    ?backoff,
                    ?class,
                    error = %e,
                    "Retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_client::ExecuteError;
    use eyre::eyre;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::new(10, Duration::from_secs(2));

        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(16));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(30)); // capped
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            classify_error(&eyre!("connection refused")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&eyre!("request timed out")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&eyre!("something odd")),
            ErrorClass::Unknown
        );

        let rejected: eyre::Report = ExecuteError::Rejected {
            code: 5,
            log: "connection already saved".to_string(),
        }
        .into();
        assert_eq!(classify_error(&rejected), ErrorClass::Rejected);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(eyre!("connection reset"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(assert_ok!(result), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_config(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(eyre!("connection reset")) }
        })
        .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_config(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ExecuteError::Rejected {
                    code: 5,
                    log: "operation already executed".to_string(),
                }
                .into())
            }
        })
        .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
