//! Persisted records of the deal lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{CommitmentStatus, ConnectionMode, ContentStatus, DealStatus};
use crate::types::{
    ApiKey, ContentAddress, ContentDealId, ContentId, MinerAddress, PieceCid, PieceCommitmentId,
    RemovalId, TransferId, WalletAddress,
};

/// One logical item submitted for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub address: ContentAddress,
    pub name: String,
    pub size: u64,
    pub requesting_api_key: ApiKey,
    pub connection_mode: ConnectionMode,
    pub status: ContentStatus,
    pub last_message: Option<String>,
    pub piece_commitment_id: Option<PieceCommitmentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    /// Whether a piece commitment is attached.
    pub fn has_commitment(&self) -> bool {
        self.piece_commitment_id.is_some()
    }
}

/// Fields supplied when a content record is created. The store assigns the
/// identifier and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub address: ContentAddress,
    pub name: String,
    pub size: u64,
    pub requesting_api_key: ApiKey,
    pub connection_mode: ConnectionMode,
    pub status: ContentStatus,
}

/// A piece commitment derived from (or declared for) a content's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceCommitment {
    pub id: PieceCommitmentId,
    pub address: ContentAddress,
    pub piece: PieceCid,
    pub size: u64,
    pub padded_piece_size: u64,
    pub unpadded_piece_size: u64,
    pub status: CommitmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a piece commitment is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPieceCommitment {
    pub address: ContentAddress,
    pub piece: PieceCid,
    pub size: u64,
    pub padded_piece_size: u64,
    pub unpadded_piece_size: u64,
    pub status: CommitmentStatus,
}

/// Padded piece size for an unpadded size (the 127-to-128 expansion).
///
/// # Examples
///
/// ```
/// assert_eq!(delta_core::model::padded_size(127), Some(128));
/// assert_eq!(delta_core::model::padded_size(2_032), Some(2_048));
/// assert_eq!(delta_core::model::padded_size(u64::MAX), None);
/// ```
pub const fn padded_size(unpadded: u64) -> Option<u64> {
    unpadded.checked_add(unpadded / 127)
}

/// Unpadded piece size for a padded size.
pub const fn unpadded_size(padded: u64) -> u64 {
    padded - padded / 128
}

/// Proposal options stored per content at ingestion and copied onto every
/// deal made for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealProposalParameters {
    pub content_id: ContentId,
    pub miner: MinerAddress,
    pub wallet: Option<WalletAddress>,
    pub label: String,
    /// Deal term in epochs.
    pub duration: i64,
    /// Epoch at which sealing must have finished, when pinned by the client.
    pub start_epoch: Option<i64>,
    pub verified_deal: bool,
    pub remove_unsealed_copy: bool,
    pub skip_ipni_announce: bool,
    pub replication: u32,
}

/// One storage arrangement for a content with a single counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDeal {
    pub id: ContentDealId,
    pub content_id: ContentId,
    pub miner: MinerAddress,
    pub proposal: DealProposalParameters,
    pub transfer_id: Option<TransferId>,
    pub on_chain_deal_id: Option<i64>,
    pub transfer_started_at: Option<DateTime<Utc>>,
    pub transfer_finished_at: Option<DateTime<Utc>>,
    pub sealed_at: Option<DateTime<Utc>>,
    pub on_chain_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentDeal {
    /// Status derived from the deal's timeline.
    pub fn status(&self) -> DealStatus {
        if self.failed_at.is_some() {
            DealStatus::Failed
        } else if self.transfer_finished_at.is_some() {
            DealStatus::TransferFinished
        } else if self.transfer_started_at.is_some() {
            DealStatus::TransferStarted
        } else {
            DealStatus::Proposed
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Record the start of the data transfer.
    pub fn mark_transfer_started(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        self.transfer_started_at.get_or_insert(at);
        self.last_message = Some(message.into());
        self.updated_at = at;
    }

    /// Record a completed transfer. The deal is treated as sealed and on
    /// chain at the same instant.
    pub fn mark_transfer_finished(
        &mut self,
        at: DateTime<Utc>,
        on_chain_deal_id: Option<i64>,
        message: impl Into<String>,
    ) {
        self.on_chain_deal_id = on_chain_deal_id.or(self.on_chain_deal_id);
        self.transfer_finished_at = Some(at);
        self.sealed_at = Some(at);
        self.on_chain_at = Some(at);
        self.last_message = Some(message.into());
        self.updated_at = at;
    }

    /// Record an authoritative failure.
    pub fn mark_failed(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        self.failed_at = Some(at);
        self.last_message = Some(message.into());
        self.updated_at = at;
    }
}

/// Fields supplied when a deal record is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContentDeal {
    pub content_id: ContentId,
    pub miner: MinerAddress,
    pub proposal: DealProposalParameters,
}

/// A pending deletion of the local copy of a content's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCopyRemoval {
    pub id: RemovalId,
    pub content_id: ContentId,
    pub address: ContentAddress,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
