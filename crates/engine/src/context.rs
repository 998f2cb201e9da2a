use std::sync::Arc;

use delta_executor::{DeadLetterSink, Dispatcher, RetryPolicy};
use delta_provider::{ContentStore, DealProposer, PieceCommitmentDeriver, TransferClient};
use delta_state::DealStore;

use crate::registry::{DealLocks, TransferRegistry};

/// Collaborators shared by every job, the reconciler and the scheduler.
pub struct EngineContext {
    pub(crate) store: Arc<dyn DealStore>,
    pub(crate) content: Arc<dyn ContentStore>,
    pub(crate) deriver: Arc<dyn PieceCommitmentDeriver>,
    pub(crate) proposer: Arc<dyn DealProposer>,
    pub(crate) transfers: Arc<dyn TransferClient>,
    pub(crate) registry: TransferRegistry,
    pub(crate) deal_locks: DealLocks,
    pub(crate) retry: RetryPolicy,
    pub(crate) dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl EngineContext {
    pub fn store(&self) -> &Arc<dyn DealStore> {
        &self.store
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    pub fn deal_locks(&self) -> &DealLocks {
        &self.deal_locks
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sink receiving failed jobs, if one was configured.
    pub fn dead_letters(&self) -> Option<&Arc<dyn DeadLetterSink>> {
        self.dead_letters.as_ref()
    }

    /// A fresh dispatcher reporting to the shared dead-letter sink, if any.
    pub fn new_dispatcher(&self) -> Dispatcher {
        match &self.dead_letters {
            Some(sink) => Dispatcher::with_dead_letters(Arc::clone(sink)),
            None => Dispatcher::new(),
        }
    }
}
