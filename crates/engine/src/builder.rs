use std::sync::Arc;

use delta_executor::{DeadLetterSink, ExecutorConfig};
use delta_provider::{
    ContentStore, DealProposer, DigestPieceDeriver, PieceCommitmentDeriver, TransferClient,
};
use delta_state::DealStore;

use crate::admission::{AdmissionControl, DEFAULT_BYTES_PER_CPU, HostResources};
use crate::context::EngineContext;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::reconciler::Reconciler;
use crate::registry::{DealLocks, TransferRegistry};

/// Fluent builder for constructing an [`Engine`].
///
/// A [`DealStore`], a [`ContentStore`], a [`DealProposer`] and a
/// [`TransferClient`] must be supplied. The commitment deriver defaults to
/// [`DigestPieceDeriver`] and admission is sized from the current host.
pub struct EngineBuilder {
    store: Option<Arc<dyn DealStore>>,
    content: Option<Arc<dyn ContentStore>>,
    deriver: Option<Arc<dyn PieceCommitmentDeriver>>,
    proposer: Option<Arc<dyn DealProposer>>,
    transfers: Option<Arc<dyn TransferClient>>,
    executor_config: ExecutorConfig,
    resources: Option<HostResources>,
    bytes_per_cpu: u64,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            content: None,
            deriver: None,
            proposer: None,
            transfers: None,
            executor_config: ExecutorConfig::default(),
            resources: None,
            bytes_per_cpu: DEFAULT_BYTES_PER_CPU,
            dead_letters: None,
        }
    }

    /// Set the deal store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DealStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the store holding local copies of content.
    #[must_use]
    pub fn content_store(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    #[must_use]
    pub fn deriver(mut self, deriver: Arc<dyn PieceCommitmentDeriver>) -> Self {
        self.deriver = Some(deriver);
        self
    }

    #[must_use]
    pub fn proposer(mut self, proposer: Arc<dyn DealProposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    #[must_use]
    pub fn transfer_client(mut self, transfers: Arc<dyn TransferClient>) -> Self {
        self.transfers = Some(transfers);
        self
    }

    /// Set the executor configuration (workers, retry policy).
    #[must_use]
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Per-CPU transfer budget used when sampling the host.
    #[must_use]
    pub fn bytes_per_cpu(mut self, bytes: u64) -> Self {
        self.bytes_per_cpu = bytes;
        self
    }

    /// Use fixed host resources instead of sampling the host.
    #[must_use]
    pub fn host_resources(mut self, resources: HostResources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Record failed jobs in `sink`.
    #[must_use]
    pub fn dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Consume the builder and produce a configured [`Engine`].
    ///
    /// Returns an [`EngineError::Configuration`] if a required collaborator
    /// has not been set.
    pub fn build(self) -> Result<Engine, EngineError> {
        let store = self
            .store
            .ok_or_else(|| EngineError::Configuration("deal store is required".into()))?;
        let content = self
            .content
            .ok_or_else(|| EngineError::Configuration("content store is required".into()))?;
        let proposer = self
            .proposer
            .ok_or_else(|| EngineError::Configuration("deal proposer is required".into()))?;
        let transfers = self
            .transfers
            .ok_or_else(|| EngineError::Configuration("transfer client is required".into()))?;
        let deriver = self
            .deriver
            .unwrap_or_else(|| Arc::new(DigestPieceDeriver::new()));

        let ctx = Arc::new(EngineContext {
            store,
            content,
            deriver,
            proposer,
            transfers,
            registry: TransferRegistry::new(),
            deal_locks: DealLocks::new(),
            retry: self.executor_config.retry.clone(),
            dead_letters: self.dead_letters,
        });

        let dispatcher = ctx.new_dispatcher();
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&ctx), dispatcher.clone()));
        let admission = Arc::new(match self.resources {
            Some(resources) => AdmissionControl::new(resources),
            None => AdmissionControl::for_host(self.bytes_per_cpu),
        });

        Ok(Engine {
            ctx,
            dispatcher,
            reconciler,
            admission,
            executor_config: self.executor_config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use delta_provider::testing::{MemoryContentStore, MockTransferClient, RecordingProposer};
    use delta_state_memory::MemoryDealStore;

    use super::*;

    fn complete() -> EngineBuilder {
        EngineBuilder::new()
            .store(Arc::new(MemoryDealStore::new()))
            .content_store(Arc::new(MemoryContentStore::new()))
            .proposer(Arc::new(RecordingProposer::new()))
            .transfer_client(Arc::new(MockTransferClient::new()))
    }

    #[test]
    fn build_missing_store_returns_error() {
        let result = EngineBuilder::new()
            .content_store(Arc::new(MemoryContentStore::new()))
            .build();
        match result {
            Err(EngineError::Configuration(msg)) => assert!(msg.contains("deal store")),
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn build_missing_transfer_client_returns_error() {
        let result = EngineBuilder::new()
            .store(Arc::new(MemoryDealStore::new()))
            .content_store(Arc::new(MemoryContentStore::new()))
            .proposer(Arc::new(RecordingProposer::new()))
            .build();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn build_with_required_fields_succeeds() {
        let engine = complete()
            .host_resources(HostResources {
                cpus: 2,
                bytes_per_cpu: 100,
            })
            .build()
            .unwrap();
        assert_eq!(engine.admission().resources().budget(), 200);
        assert_eq!(engine.executor_config().workers, 4);
        assert_eq!(engine.dispatcher().pending(), 0);
    }
}
