use crate::retry::RetryPolicy;

/// Configuration shared by the dispatchers of a node.
///
/// # Examples
///
/// ```
/// use delta_executor::ExecutorConfig;
///
/// let config = ExecutorConfig::default();
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.cleanup_workers, 10);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Worker count used when draining the main dispatcher.
    pub workers: usize,
    /// Worker count used by each scheduler cycle.
    pub cleanup_workers: usize,
    /// Policy followed by jobs that resubmit themselves after a failure.
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cleanup_workers: 10,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::retry::RetryStrategy;

    #[test]
    fn default_config_values() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.retry.max_attempts, Some(5));
    }

    #[test]
    fn config_custom_values() {
        let cfg = ExecutorConfig {
            workers: 1,
            cleanup_workers: 2,
            retry: RetryPolicy {
                strategy: RetryStrategy::Constant {
                    delay: Duration::from_secs(1),
                },
                max_attempts: None,
            },
        };
        assert_eq!(cfg.cleanup_workers, 2);
        assert!(cfg.retry.allows_another(1_000));
    }
}
