use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;

/// A job execution that ended in an error.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    /// Kind of job, as reported by [`Job::name`](crate::Job::name).
    pub job: &'static str,
    /// Job-specific description, typically the ids it worked on.
    pub description: String,
    /// Human-readable description of the error.
    pub error: String,
    pub timestamp: SystemTime,
}

/// Destination for failed job executions.
///
/// Implementations must be `Send + Sync` for use across worker tasks.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Record a failed job.
    async fn push(&self, job: &'static str, description: String, error: String);

    /// Drain all entries, returning them.
    async fn drain(&self) -> Vec<DeadLetterEntry>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory dead-letter queue.
///
/// A buffer behind a [`Mutex`]; no guard is ever handed out, so the lock is
/// never held across an `.await`. A bounded queue drops its oldest entry to
/// make room for a new one.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    capacity: Option<usize>,
    dropped: AtomicU64,
}

impl DeadLetterQueue {
    /// Create a new empty dead-letter queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use delta_executor::dlq::DeadLetterQueue;
    ///
    /// let dlq = DeadLetterQueue::new();
    /// assert!(dlq.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue holding at most `capacity` entries, oldest dropped first.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn push(&self, job: &'static str, description: String, error: String) {
        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            while entries.len() >= capacity {
                entries.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.push_back(DeadLetterEntry {
            job,
            description,
            error,
            timestamp: SystemTime::now(),
        });
    }

    /// Drain all entries, oldest first. The queue is empty afterwards.
    pub fn drain(&self) -> Vec<DeadLetterEntry> {
        std::mem::take(&mut *self.entries.lock()).into()
    }

    /// Copy of the current entries, leaving them in place.
    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Entries discarded to stay within capacity since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn push(&self, job: &'static str, description: String, error: String) {
        DeadLetterQueue::push(self, job, description, error);
    }

    async fn drain(&self) -> Vec<DeadLetterEntry> {
        DeadLetterQueue::drain(self)
    }

    async fn len(&self) -> usize {
        DeadLetterQueue::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain() {
        let dlq = DeadLetterQueue::new();
        dlq.push("piece-commitment", "content 1".into(), "resolver down".into());
        dlq.push("deal-maker", "content 2".into(), "no commitment".into());
        assert_eq!(dlq.len(), 2);

        let entries = dlq.drain();
        assert_eq!(entries[0].job, "piece-commitment");
        assert_eq!(entries[1].error, "no commitment");
        assert!(dlq.is_empty());
    }

    #[test]
    fn snapshot_keeps_entries() {
        let dlq = DeadLetterQueue::new();
        dlq.push("job", "d".into(), "e".into());
        assert_eq!(dlq.snapshot().len(), 1);
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let dlq = DeadLetterQueue::bounded(2);
        for n in 1..=5 {
            dlq.push("deal-maker", format!("content {n}"), "rejected".into());
        }
        assert_eq!(dlq.len(), 2);
        assert_eq!(dlq.dropped(), 3);

        let entries = dlq.drain();
        assert_eq!(entries[0].description, "content 4");
        assert_eq!(entries[1].description, "content 5");

        dlq.push("deal-maker", "content 6".into(), "rejected".into());
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq.dropped(), 3);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let dlq = DeadLetterQueue::bounded(0);
        dlq.push("job", "d".into(), "e".into());
        assert!(dlq.is_empty());
        assert_eq!(dlq.dropped(), 1);
    }

    #[test]
    fn unbounded_queue_keeps_everything() {
        let dlq = DeadLetterQueue::new();
        for _ in 0..100 {
            dlq.push("job", "d".into(), "e".into());
        }
        assert_eq!(dlq.len(), 100);
        assert_eq!(dlq.capacity(), None);
        assert_eq!(dlq.dropped(), 0);
    }

    #[tokio::test]
    async fn sink_trait_delegates() {
        let dlq = DeadLetterQueue::new();
        let sink: &dyn DeadLetterSink = &dlq;
        assert!(sink.is_empty().await);
        sink.push("job", "d".into(), "e".into()).await;
        assert_eq!(sink.len().await, 1);
        assert_eq!(sink.drain().await.len(), 1);
    }
}
