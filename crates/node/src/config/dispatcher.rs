use std::time::Duration;

use delta_executor::{ExecutorConfig, RetryPolicy, RetryStrategy};
use serde::Deserialize;

/// Worker counts and retry policy of the node's dispatchers.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Workers draining the main dispatcher.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Workers draining each scheduler cycle.
    #[serde(default = "default_max_cleanup_workers")]
    pub max_cleanup_workers: usize,
    /// Piece-commitment attempts per content before giving up until the
    /// next scheduler cycle. Zero retries without limit.
    #[serde(default = "default_max_commitment_attempts")]
    pub max_commitment_attempts: u32,
    /// Backoff before the first retry (milliseconds).
    #[serde(default = "default_retry_base_millis")]
    pub retry_base_millis: u64,
    /// Upper bound on the backoff (seconds).
    #[serde(default = "default_retry_max_seconds")]
    pub retry_max_seconds: u64,
    /// Failed jobs kept for inspection; older ones are dropped.
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_cleanup_workers: default_max_cleanup_workers(),
            max_commitment_attempts: default_max_commitment_attempts(),
            retry_base_millis: default_retry_base_millis(),
            retry_max_seconds: default_retry_max_seconds(),
            dead_letter_capacity: default_dead_letter_capacity(),
        }
    }
}

impl DispatcherConfig {
    /// Executor settings with exponential, jittered backoff.
    pub fn executor_config(&self) -> ExecutorConfig {
        let strategy = RetryStrategy::Exponential {
            base: Duration::from_millis(self.retry_base_millis),
            max: Duration::from_secs(self.retry_max_seconds),
            multiplier: 2.0,
            jitter: true,
        };
        let retry = match self.max_commitment_attempts {
            0 => RetryPolicy::unbounded(strategy),
            max => RetryPolicy {
                strategy,
                max_attempts: Some(max),
            },
        };
        ExecutorConfig {
            workers: self.workers,
            cleanup_workers: self.max_cleanup_workers,
            retry,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_cleanup_workers() -> usize {
    10
}

fn default_max_commitment_attempts() -> u32 {
    5
}

fn default_retry_base_millis() -> u64 {
    500
}

fn default_retry_max_seconds() -> u64 {
    60
}

fn default_dead_letter_capacity() -> usize {
    1000
}
