//! In-memory collaborators for exercising the engine without a network or
//! a disk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use delta_core::{
    ApiKey, ChannelStatus, CommitmentStatus, ConnectionMode, Content, ContentAddress, ContentDeal,
    ContentDealId, ContentId, ContentStatus, DealProposalParameters, MinerAddress, PieceCid,
    PieceCommitment, PieceCommitmentId, TransferId,
};
use parking_lot::Mutex;

use crate::commitment::{DerivedCommitment, DigestPieceDeriver, PieceCommitmentDeriver};
use crate::content::{ContentReader, ContentStore, content_address};
use crate::error::ProviderError;
use crate::proposer::{DealProposer, ProposalRequest};
use crate::transfer::{TransferClient, TransferState};

// -- Content store -------------------------------------------------------------

/// A [`ContentStore`] over a hash map.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<ContentAddress, Bytes>>,
    removed: Mutex<Vec<ContentAddress>>,
    fail_removals: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under its digest address.
    pub fn insert(&self, data: impl Into<Bytes>) -> ContentAddress {
        let data = data.into();
        let address = content_address(&data);
        self.blobs.lock().insert(address.clone(), data);
        address
    }

    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.blobs.lock().contains_key(address)
    }

    /// Addresses passed to successful [`ContentStore::remove`] calls.
    pub fn removed(&self) -> Vec<ContentAddress> {
        self.removed.lock().clone()
    }

    /// Make every subsequent removal fail.
    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn resolve(&self, address: &ContentAddress) -> Result<ContentReader, ProviderError> {
        let data = self
            .blobs
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("content {address}")))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn remove(&self, address: &ContentAddress) -> Result<(), ProviderError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(ProviderError::Io("removal disabled".into()));
        }
        self.blobs.lock().remove(address);
        self.removed.lock().push(address.clone());
        Ok(())
    }
}

// -- Commitment deriver --------------------------------------------------------

/// A deriver that fails a fixed number of times before delegating to
/// [`DigestPieceDeriver`].
#[derive(Debug, Default)]
pub struct FlakyDeriver {
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyDeriver {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    /// Number of `derive` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PieceCommitmentDeriver for FlakyDeriver {
    async fn derive(
        &self,
        address: &ContentAddress,
        store: &dyn ContentStore,
    ) -> Result<DerivedCommitment, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProviderError::ExecutionFailed("derivation failed".into()));
        }
        DigestPieceDeriver::new().derive(address, store).await
    }
}

// -- Proposer ------------------------------------------------------------------

/// A proposal seen by [`RecordingProposer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedProposal {
    pub content_id: ContentId,
    pub deal_id: ContentDealId,
    pub miner: MinerAddress,
    pub piece: PieceCid,
}

/// A [`DealProposer`] that records proposals and answers with the deal id
/// as transfer id, or with a configured failure.
#[derive(Debug, Default)]
pub struct RecordingProposer {
    proposals: Mutex<Vec<RecordedProposal>>,
    failure: Mutex<Option<String>>,
}

impl RecordingProposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A proposer that rejects every proposal with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let proposer = Self::default();
        proposer.set_failure(Some(message.into()));
        proposer
    }

    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    pub fn proposals(&self) -> Vec<RecordedProposal> {
        self.proposals.lock().clone()
    }
}

#[async_trait]
impl DealProposer for RecordingProposer {
    async fn propose(&self, request: ProposalRequest<'_>) -> Result<TransferId, ProviderError> {
        self.proposals.lock().push(RecordedProposal {
            content_id: request.content.id,
            deal_id: request.deal.id,
            miner: request.deal.miner.clone(),
            piece: request.commitment.piece.clone(),
        });
        if let Some(message) = self.failure.lock().clone() {
            return Err(ProviderError::Rejected(message));
        }
        Ok(TransferId::new(request.deal.id.to_string()))
    }
}

// -- Transfer client -----------------------------------------------------------

/// A [`TransferClient`] with scripted channel states.
#[derive(Debug, Default)]
pub struct MockTransferClient {
    states: Mutex<HashMap<TransferId, TransferState>>,
    restarts: Mutex<Vec<TransferId>>,
}

impl MockTransferClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, transfer_id: TransferId, status: ChannelStatus) {
        self.states.lock().insert(
            transfer_id,
            TransferState {
                status,
                message: String::new(),
            },
        );
    }

    /// Transfers passed to `restart_transfer`, in call order.
    pub fn restarts(&self) -> Vec<TransferId> {
        self.restarts.lock().clone()
    }
}

#[async_trait]
impl TransferClient for MockTransferClient {
    async fn transfer_status(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferState>, ProviderError> {
        Ok(self.states.lock().get(transfer_id).cloned())
    }

    async fn restart_transfer(&self, transfer_id: &TransferId) -> Result<(), ProviderError> {
        self.restarts.lock().push(transfer_id.clone());
        Ok(())
    }
}

// -- Fixtures ------------------------------------------------------------------

/// A content, commitment and deal triple for proposer tests.
pub fn sample_proposal(deal_id: i64) -> (Content, PieceCommitment, ContentDeal) {
    let now = Utc::now();
    let content = Content {
        id: ContentId::new(1),
        address: ContentAddress::new("bafy-sample"),
        name: "sample.car".into(),
        size: 1024,
        requesting_api_key: ApiKey::new("key"),
        connection_mode: ConnectionMode::EndToEnd,
        status: ContentStatus::MakingDealProposal,
        last_message: None,
        piece_commitment_id: Some(PieceCommitmentId::new(1)),
        created_at: now,
        updated_at: now,
    };
    let commitment = PieceCommitment {
        id: PieceCommitmentId::new(1),
        address: content.address.clone(),
        piece: PieceCid::new("sha256:00"),
        size: 1024,
        padded_piece_size: 2048,
        unpadded_piece_size: 2032,
        status: CommitmentStatus::Open,
        created_at: now,
        updated_at: now,
    };
    let proposal = DealProposalParameters {
        content_id: content.id,
        miner: MinerAddress::new("f01234"),
        wallet: None,
        label: content.address.to_string(),
        duration: 1_555_200,
        start_epoch: None,
        verified_deal: true,
        remove_unsealed_copy: false,
        skip_ipni_announce: false,
        replication: 0,
    };
    let deal = ContentDeal {
        id: ContentDealId::new(deal_id),
        content_id: content.id,
        miner: proposal.miner.clone(),
        proposal,
        transfer_id: None,
        on_chain_deal_id: None,
        transfer_started_at: None,
        transfer_finished_at: None,
        sealed_at: None,
        on_chain_at: None,
        failed_at: None,
        last_message: None,
        created_at: now,
        updated_at: now,
    };
    (content, commitment, deal)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip_and_removal() {
        let store = MemoryContentStore::new();
        let address = store.insert(b"abc".to_vec());
        let mut reader = store.resolve(&address).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");

        store.set_fail_removals(true);
        assert!(store.remove(&address).await.is_err());
        assert!(store.contains(&address));

        store.set_fail_removals(false);
        store.remove(&address).await.unwrap();
        assert!(!store.contains(&address));
        assert_eq!(store.removed(), vec![address]);
    }

    #[tokio::test]
    async fn flaky_deriver_recovers() {
        let store = MemoryContentStore::new();
        let address = store.insert(b"abc".to_vec());
        let deriver = FlakyDeriver::new(2);

        assert!(deriver.derive(&address, &store).await.is_err());
        assert!(deriver.derive(&address, &store).await.is_err());
        assert!(deriver.derive(&address, &store).await.is_ok());
        assert_eq!(deriver.calls(), 3);
    }

    #[tokio::test]
    async fn recording_proposer_records_failures_too() {
        let (content, commitment, deal) = sample_proposal(4);
        let proposer = RecordingProposer::failing("no capacity");
        let request = ProposalRequest {
            content: &content,
            commitment: &commitment,
            deal: &deal,
        };
        let err = proposer.propose(request).await.unwrap_err();
        assert_eq!(err.to_string(), "proposal rejected: no capacity");

        proposer.set_failure(None);
        let transfer = proposer.propose(request).await.unwrap();
        assert_eq!(transfer.as_str(), "4");
        assert_eq!(proposer.proposals().len(), 2);
    }

    #[tokio::test]
    async fn mock_transfer_client_scripts_states() {
        let client = MockTransferClient::new();
        let id = TransferId::new("7");
        assert!(client.transfer_status(&id).await.unwrap().is_none());

        client.set_state(id.clone(), ChannelStatus::Ongoing);
        let state = client.transfer_status(&id).await.unwrap().unwrap();
        assert_eq!(state.status, ChannelStatus::Ongoing);

        client.restart_transfer(&id).await.unwrap();
        assert_eq!(client.restarts(), vec![id]);
    }
}
