use std::time::Duration;

/// Backoff policy for startup operations such as the broker connection.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
}

impl RetryConfig {
    /// Delay that follows `current_ms`, capped at `max_delay_ms`.
    pub fn next_delay_ms(&self, current_ms: u64) -> u64 {
        current_ms
            .saturating_mul(self.backoff_multiplier)
            .min(self.max_delay_ms)
    }

    /// `delay_ms` scaled by `1 + jitter`, where jitter is expected in `-0.1..=0.1`.
    pub fn jittered(delay_ms: u64, jitter: f64) -> Duration {
        Duration::from_millis((delay_ms as f64 * (1.0 + jitter)).max(0.0) as u64)
    }
}
