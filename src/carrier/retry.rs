use std::time::Duration;

use rand::Rng;

use super::CarrierError;

// Bounded exponential backoff with jitter for transient carrier failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_jitter: Duration::from_millis(150),
        }
    }
}

impl RetryPolicy {
    // attempt is 1-based
    pub fn should_retry(&self, attempt: u32, error: &CarrierError) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    // base * 2^(attempt-1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay * factor
    }

    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}
