pub mod admission;
pub mod builder;
pub mod context;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod reconciler;
pub mod registry;
pub mod scheduler;

pub use admission::{AdmissionControl, DEFAULT_BYTES_PER_CPU, HostResources};
pub use builder::EngineBuilder;
pub use context::EngineContext;
pub use engine::{ContentStatusReport, DealSubmission, Engine, SubmittedContent, Upload};
pub use error::EngineError;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use registry::{DealLocks, TransferRegistry};
pub use scheduler::{CycleReport, RetryScheduler, RetrySchedulerBuilder, SchedulerConfig};
