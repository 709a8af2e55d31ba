//! Bounded retry for commit transactions
//!
//! Only storage-level contention is retried: serialization failures and
//! deadlocks abort the whole transaction without side effects, so running it
//! again is safe. Business failures (`Incomplete`, `InsufficientStock`, ...)
//! are returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::AppError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

/// SQLSTATE serialization_failure
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE deadlock_detected
const DEADLOCK_DETECTED: &str = "40P01";

/// True when the error is transient contention in the database
pub fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::DatabaseError(sqlx::Error::Database(db_err)) => matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Execute an async operation, retrying transient contention with
/// exponential backoff
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    with_retry_when(config, is_retryable, operation).await
}

async fn with_retry_when<F, Fut, T, P>(
    config: &RetryConfig,
    retryable: P,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    P: Fn(&AppError) -> bool,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::debug!("Commit succeeded after {} attempts", attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !retryable(&error) {
                    return Err(error);
                }

                tracing::warn!(
                    "Commit attempt {} hit contention: {}. Retrying in {:?}",
                    attempts,
                    error,
                    delay
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), AppError> = with_retry(&fast(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::NotFound("Purchase request".to_string()))
        })
        .await;

        assert_err!(result);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retry_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry_when(
            &fast(),
            |e| matches!(e, AppError::Internal(_)),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::Internal("contention".to_string()))
                } else {
                    Ok(7)
                }
            },
        )
        .await;

        assert_eq!(assert_ok!(result), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), AppError> = with_retry_when(
            &fast(),
            |_| true,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Internal("contention".to_string()))
            },
        )
        .await;

        assert_err!(result);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
