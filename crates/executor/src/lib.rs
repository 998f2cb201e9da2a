pub mod config;
pub mod dispatcher;
pub mod dlq;
pub mod job;
pub mod retry;

pub use config::ExecutorConfig;
pub use dispatcher::{Dispatcher, RunSummary};
pub use dlq::{DeadLetterEntry, DeadLetterQueue, DeadLetterSink};
pub use job::{Job, JobError};
pub use retry::{RetryPolicy, RetryStrategy};
