use delta_engine::DEFAULT_BYTES_PER_CPU;
use serde::Deserialize;

/// Host capacity used by admission control.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    /// Bytes each CPU may have in transfer at once.
    #[serde(default = "default_bytes_per_cpu")]
    pub bytes_per_cpu: u64,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            bytes_per_cpu: default_bytes_per_cpu(),
        }
    }
}

fn default_bytes_per_cpu() -> u64 {
    DEFAULT_BYTES_PER_CPU
}
