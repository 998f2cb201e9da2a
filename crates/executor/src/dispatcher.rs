use std::collections::VecDeque;
use std::ops::AddAssign;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::dlq::DeadLetterSink;
use crate::job::{Job, JobError};

/// Counts of one [`Dispatcher::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs executed by this run's workers, successful or not.
    pub executed: usize,
    /// Jobs that returned an error or panicked.
    pub failed: usize,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.executed - self.failed
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.executed += rhs.executed;
        self.failed += rhs.failed;
    }
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<Box<dyn Job>>,
    in_flight: usize,
}

struct Inner {
    queue: Mutex<Queue>,
    /// Signalled whenever a job is enqueued or finishes.
    changed: Notify,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

/// An in-process job queue drained by a bounded pool of worker tasks.
///
/// The dispatcher is a cheap, cloneable handle: jobs hold a clone and
/// enqueue follow-up work on it while they run. Every dispatcher owns an
/// independent queue.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use delta_executor::{Dispatcher, Job, JobError};
///
/// struct Hello;
///
/// #[async_trait]
/// impl Job for Hello {
///     fn name(&self) -> &'static str {
///         "hello"
///     }
///
///     async fn execute(self: Box<Self>) -> Result<(), JobError> {
///         Ok(())
///     }
/// }
///
/// let dispatcher = Dispatcher::new();
/// dispatcher.enqueue(Hello);
/// assert_eq!(dispatcher.pending(), 1);
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.inner.queue.lock();
        f.debug_struct("Dispatcher")
            .field("pending", &queue.pending.len())
            .field("in_flight", &queue.in_flight)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with an empty queue.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a dispatcher that records failed jobs in `sink`.
    pub fn with_dead_letters(sink: Arc<dyn DeadLetterSink>) -> Self {
        Self::build(Some(sink))
    }

    fn build(dead_letters: Option<Arc<dyn DeadLetterSink>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Queue::default()),
                changed: Notify::new(),
                dead_letters,
            }),
        }
    }

    /// Append a job to the pending list. Never blocks.
    pub fn enqueue(&self, job: impl Job) {
        self.enqueue_boxed(Box::new(job));
    }

    pub fn enqueue_boxed(&self, job: Box<dyn Job>) {
        debug!(job = job.name(), detail = %job.describe(), "job enqueued");
        self.inner.queue.lock().pending.push_back(job);
        self.inner.changed.notify_waiters();
    }

    /// Enqueue `job` and drain the queue with `concurrency` workers.
    pub async fn enqueue_and_run(&self, job: impl Job, concurrency: usize) -> RunSummary {
        self.enqueue(job);
        self.run(concurrency).await
    }

    /// Drain the queue with up to `concurrency` workers.
    ///
    /// Returns once the pending list is empty and no job is executing,
    /// including follow-ups enqueued by jobs of this run. A concurrency of
    /// zero is treated as one.
    pub async fn run(&self, concurrency: usize) -> RunSummary {
        let workers = concurrency.max(1);
        let mut set = JoinSet::new();
        for worker in 0..workers {
            let inner = Arc::clone(&self.inner);
            set.spawn(async move { inner.work(worker).await });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(worker_summary) => summary += worker_summary,
                Err(e) => error!(error = %e, "dispatcher worker aborted"),
            }
        }
        debug!(
            executed = summary.executed,
            failed = summary.failed,
            "dispatcher drained"
        );
        summary
    }

    /// Wait until at least one job is pending.
    pub async fn wait_for_work(&self) {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if !self.inner.queue.lock().pending.is_empty() {
                return;
            }
            changed.await;
        }
    }

    /// Number of jobs waiting to be picked up.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    /// Number of jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.queue.lock().in_flight
    }
}

impl Inner {
    async fn work(&self, worker: usize) -> RunSummary {
        let mut summary = RunSummary::default();
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            // Claiming a job and bumping the in-flight count happen under one
            // lock so an idle worker never sees an empty queue with work
            // still running elsewhere unaccounted for.
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(job) => {
                        queue.in_flight += 1;
                        Some(job)
                    }
                    None if queue.in_flight == 0 => return summary,
                    None => None,
                }
            };

            let Some(job) = next else {
                changed.await;
                continue;
            };

            let ok = self.execute(job, worker).await;
            self.queue.lock().in_flight -= 1;
            self.changed.notify_waiters();

            summary.executed += 1;
            if !ok {
                summary.failed += 1;
            }
        }
    }

    async fn execute(&self, job: Box<dyn Job>, worker: usize) -> bool {
        let name = job.name();
        let description = job.describe();
        debug!(job = name, detail = %description, worker, "job started");

        let result = match AssertUnwindSafe(job.execute()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(JobError::Panicked(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(()) => {
                debug!(job = name, detail = %description, worker, "job finished");
                true
            }
            Err(err) => {
                warn!(job = name, detail = %description, worker, error = %err, "job failed");
                if let Some(sink) = &self.dead_letters {
                    sink.push(name, description, err.to_string()).await;
                }
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
