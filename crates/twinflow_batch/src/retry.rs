//! Exponential backoff for throttled AWS calls.
//!
//! Only failures whose message carries a rate-limit marker are retried; every
//! other error is returned on the first attempt.

use std::future::Future;

use tracing::warn;
use twinflow_core::retry::{ErrorClass, RetryPolicy};

use crate::error::{Result, TwinflowError};

pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    loop {
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        attempts += 1;

        if error.class() != ErrorClass::Throttled {
            return Err(error);
        }
        if !policy.has_attempts_left(attempts) {
            return Err(TwinflowError::RetriesExhausted {
                operation: operation.to_string(),
                attempts,
                message: error.to_string(),
            });
        }

        let delay = policy.delay_for_attempt(attempts - 1);
        warn!(
            operation,
            attempt = attempts,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "throttled, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
