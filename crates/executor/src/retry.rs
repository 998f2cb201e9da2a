use std::time::Duration;

/// Strategy for computing the delay before a job is resubmitted.
///
/// All variants clamp the computed delay to their configured maximum.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Exponential backoff: `base * multiplier^attempt`, optionally with
    /// deterministic jitter.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        /// Spread retries of concurrent jobs by up to +40%.
        jitter: bool,
    },
    /// Linear backoff: `delay * (attempt + 1)`, clamped to `max`.
    Linear { delay: Duration, max: Duration },
    /// Constant delay between every attempt.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Compute the delay for the given zero-based `attempt` number.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use delta_executor::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::Constant { delay: Duration::from_secs(1) };
    /// assert_eq!(strategy.delay_for(0), Duration::from_secs(1));
    /// assert_eq!(strategy.delay_for(5), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => {
                // Attempt counts are capped well below i32::MAX by policy.
                #[allow(clippy::cast_possible_wrap)]
                let raw = base.as_secs_f64() * multiplier.powi(attempt.min(64) as i32);
                let adjusted = if *jitter {
                    raw * (1.0 + 0.1 * f64::from(attempt % 5))
                } else {
                    raw
                };
                Duration::from_secs_f64(adjusted.min(max.as_secs_f64()))
            }
            Self::Linear { delay, max } => {
                let raw = delay.as_secs_f64() * f64::from(attempt.saturating_add(1));
                Duration::from_secs_f64(raw.min(max.as_secs_f64()))
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// When and how often a self-resubmitting job may try again.
///
/// The dispatcher never retries on its own; jobs consult their policy and
/// enqueue a fresh instance of themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    /// Total attempts allowed, the first one included. `None` means the job
    /// keeps resubmitting until it succeeds.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// A policy that never gives up.
    pub fn unbounded(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            max_attempts: None,
        }
    }

    /// Whether another attempt may follow `attempts_made` failed ones.
    ///
    /// # Examples
    ///
    /// ```
    /// use delta_executor::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert!(policy.allows_another(1));
    /// assert!(!policy.allows_another(5));
    /// ```
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }

    /// Delay to wait before attempt number `attempt` (zero-based). The first
    /// attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => self.strategy.delay_for(n - 1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            max_attempts: Some(5),
        }
    }
}
