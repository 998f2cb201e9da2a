//! Transfer events that reach the reconciler before the proposal returns.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use delta_core::{
    ApiKey, ChannelStateUpdate, ChannelStatus, ContentId, ContentStatus, DealRequest, DealStatus,
    MinerAddress, TransferId,
};
use delta_engine::{DealSubmission, Engine, EngineBuilder, HostResources, Reconciler};
use delta_provider::testing::{MemoryContentStore, MockTransferClient};
use delta_provider::{DealProposer, ProposalRequest, ProviderError};
use delta_state::DealStore;
use delta_state_memory::MemoryDealStore;

/// Feeds channel states to the reconciler for the deal being proposed, then
/// answers with transfer id `42` or with a rejection.
struct EventfulProposer {
    reconciler: OnceLock<Arc<Reconciler>>,
    statuses: Vec<ChannelStatus>,
    reject: bool,
}

#[async_trait]
impl DealProposer for EventfulProposer {
    async fn propose(&self, request: ProposalRequest<'_>) -> Result<TransferId, ProviderError> {
        let transfer_id = TransferId::new("42");
        let reconciler = self.reconciler.get().expect("reconciler is wired");
        for status in &self.statuses {
            reconciler
                .handle(
                    ChannelStateUpdate {
                        deal_id: request.deal.id,
                        status: *status,
                        transfer_id: transfer_id.clone(),
                        message: String::new(),
                    }
                    .into(),
                )
                .await
                .expect("event should apply");
        }
        if self.reject {
            return Err(ProviderError::Rejected("too late".into()));
        }
        Ok(transfer_id)
    }
}

struct Setup {
    engine: Engine,
    store: Arc<MemoryDealStore>,
    content: Arc<MemoryContentStore>,
}

fn setup(statuses: Vec<ChannelStatus>, reject: bool) -> Setup {
    let store = Arc::new(MemoryDealStore::new());
    let content = Arc::new(MemoryContentStore::new());
    let proposer = Arc::new(EventfulProposer {
        reconciler: OnceLock::new(),
        statuses,
        reject,
    });

    let engine = EngineBuilder::new()
        .store(store.clone())
        .content_store(content.clone())
        .proposer(proposer.clone())
        .transfer_client(Arc::new(MockTransferClient::new()))
        .host_resources(HostResources {
            cpus: 1,
            bytes_per_cpu: u64::MAX,
        })
        .build()
        .unwrap();
    assert!(
        proposer
            .reconciler
            .set(Arc::clone(engine.reconciler()))
            .is_ok()
    );

    Setup {
        engine,
        store,
        content,
    }
}

async fn submit(setup: &Setup, data: &[u8]) -> ContentId {
    let address = setup.content.insert(data.to_vec());
    let submitted = setup
        .engine
        .submit(DealSubmission {
            request: DealRequest {
                miner: Some(MinerAddress::new("f01234")),
                cid: Some(address),
                ..DealRequest::default()
            },
            api_key: ApiKey::new("race"),
            upload: None,
        })
        .await
        .unwrap();
    setup.engine.run_pending().await;
    submitted.content.id
}

#[tokio::test]
async fn finished_transfer_during_proposal_is_kept() {
    let setup = setup(vec![ChannelStatus::Requested, ChannelStatus::Completed], false);
    let content_id = submit(&setup, b"fast miner").await;

    let report = setup.engine.content_status(content_id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::TransferFinished);
    let deal = &report.deals[0];
    assert_eq!(deal.status(), DealStatus::TransferFinished);
    assert!(deal.transfer_started_at.is_some());
    assert!(deal.transfer_finished_at.is_some());
    assert_eq!(deal.on_chain_deal_id, Some(42));
    assert_eq!(deal.last_message.as_deref(), Some("transfer-finished"));
    assert_eq!(deal.transfer_id, Some(TransferId::new("42")));

    // A finished deal is not a stalled transfer.
    let stalled = setup
        .store
        .list_stalled_deals(chrono::Utc::now() + chrono::TimeDelta::hours(2))
        .await
        .unwrap();
    assert!(stalled.is_empty());
    assert!(setup.engine.context().deal_locks().is_empty());
}

#[tokio::test]
async fn started_transfer_during_proposal_is_kept() {
    let setup = setup(vec![ChannelStatus::Requested], false);
    let content_id = submit(&setup, b"moving").await;

    let report = setup.engine.content_status(content_id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::DealProposalSent);
    let deal = &report.deals[0];
    assert_eq!(deal.status(), DealStatus::TransferStarted);
    assert!(deal.transfer_started_at.is_some());
    assert_eq!(deal.transfer_id, Some(TransferId::new("42")));
    assert_eq!(
        setup.engine.context().registry().lookup(&TransferId::new("42")),
        Some(deal.id)
    );
}

#[tokio::test]
async fn rejection_after_finished_transfer_keeps_the_timeline() {
    let setup = setup(vec![ChannelStatus::Completed], true);
    let content_id = submit(&setup, b"mixed signals").await;

    let report = setup.engine.content_status(content_id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::TransferFinished);
    let deal = &report.deals[0];
    assert_eq!(deal.status(), DealStatus::TransferFinished);
    assert!(deal.failed_at.is_none());
}
