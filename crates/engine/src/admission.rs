use std::num::NonZeroUsize;

use delta_state::DealStore;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Default transfer budget per CPU: 10 GiB.
pub const DEFAULT_BYTES_PER_CPU: u64 = 10 * 1024 * 1024 * 1024;

/// Sampled capacity of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    pub cpus: usize,
    pub bytes_per_cpu: u64,
}

impl HostResources {
    /// Sample the CPUs available to this process.
    pub fn sample(bytes_per_cpu: u64) -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            cpus,
            bytes_per_cpu,
        }
    }

    /// Bytes that may be in transfer at once.
    pub fn budget(&self) -> u64 {
        u64::try_from(self.cpus)
            .unwrap_or(u64::MAX)
            .saturating_mul(self.bytes_per_cpu)
    }
}

/// Rejects new work while too much data is in transfer.
#[derive(Debug)]
pub struct AdmissionControl {
    resources: RwLock<HostResources>,
}

impl AdmissionControl {
    pub fn new(resources: HostResources) -> Self {
        Self {
            resources: RwLock::new(resources),
        }
    }

    /// Admission sized from the current host.
    pub fn for_host(bytes_per_cpu: u64) -> Self {
        Self::new(HostResources::sample(bytes_per_cpu))
    }

    pub fn resources(&self) -> HostResources {
        *self.resources.read()
    }

    /// Re-sample the host's CPUs, keeping the per-CPU budget.
    pub fn sample(&self) -> HostResources {
        let mut resources = self.resources.write();
        *resources = HostResources::sample(resources.bytes_per_cpu);
        debug!(cpus = resources.cpus, budget = resources.budget(), "host resources sampled");
        *resources
    }

    /// Fail with [`EngineError::AdmissionRejected`] when the bytes in
    /// transfer exceed the budget.
    pub async fn check(&self, store: &dyn DealStore) -> Result<(), EngineError> {
        let in_flight = store.bytes_in_transfer().await?;
        let budget = self.resources().budget();
        if in_flight > budget {
            warn!(in_flight, budget, "admission rejected");
            return Err(EngineError::AdmissionRejected { in_flight, budget });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_scales_with_cpus() {
        let resources = HostResources {
            cpus: 4,
            bytes_per_cpu: DEFAULT_BYTES_PER_CPU,
        };
        assert_eq!(resources.budget(), 40 * 1024 * 1024 * 1024);
    }

    #[test]
    fn budget_saturates() {
        let resources = HostResources {
            cpus: 2,
            bytes_per_cpu: u64::MAX,
        };
        assert_eq!(resources.budget(), u64::MAX);
    }

    #[test]
    fn sample_keeps_per_cpu_budget() {
        let admission = AdmissionControl::new(HostResources {
            cpus: 64,
            bytes_per_cpu: 7,
        });
        let sampled = admission.sample();
        assert_eq!(sampled.bytes_per_cpu, 7);
        assert!(sampled.cpus >= 1);
        assert_eq!(admission.resources(), sampled);
    }
}
