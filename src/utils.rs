use std::{fmt::Display, future::Future};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Runs `operation` until it succeeds or `max_attempts` is reached, sleeping
/// with exponential backoff and +/-10% jitter in between. `label` names the
/// operation in logs.
pub async fn retry_with_backoff<F, Fut, T, E>(
    label: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = label, attempt, "Succeeded after retrying");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if attempt >= config.max_attempts {
            warn!(
                operation = label,
                max_attempts = config.max_attempts,
                error = %error,
                "Giving up after exhausting all attempts"
            );
            return Err(error);
        }

        debug!(
            operation = label,
            attempt,
            delay_ms,
            error = %error,
            "Attempt failed, backing off"
        );

        sleep(RetryConfig::jittered(delay_ms, rand::random_range(-0.1..=0.1))).await;
        delay_ms = config.next_delay_ms(delay_ms);
    }
}
