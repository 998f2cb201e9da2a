use std::time::Duration;

use delta_engine::SchedulerConfig;
use serde::Deserialize;

/// Configuration of the retry/cleanup scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Time between cycles (seconds).
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Age after which unfinished content is re-entered (seconds).
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
    /// Age after which an unstarted transfer is restarted (seconds).
    #[serde(default = "default_stale_after")]
    pub stalled_transfer_after_seconds: u64,
    /// Re-propose content whose transfer failed.
    #[serde(default)]
    pub retry_failed_transfers: bool,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_seconds: default_interval(),
            stale_after_seconds: default_stale_after(),
            stalled_transfer_after_seconds: default_stale_after(),
            retry_failed_transfers: false,
        }
    }
}

impl SchedulerSection {
    pub fn scheduler_config(&self, cleanup_workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.interval_seconds.max(1)),
            stale_after: Duration::from_secs(self.stale_after_seconds),
            stalled_transfer_after: Duration::from_secs(self.stalled_transfer_after_seconds),
            cleanup_workers,
            retry_failed_transfers: self.retry_failed_transfers,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    30 * 60
}

fn default_stale_after() -> u64 {
    60 * 60
}
