//! Client deal requests: validation and normalisation into proposal
//! parameters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::epoch::{
    DEFAULT_DEAL_DURATION_EPOCHS, EPOCHS_PER_DAY, MAX_DEAL_DURATION_DAYS, SEALING_BUFFER_DAYS,
    date_to_height, days_to_epochs,
};
use crate::model::{DealProposalParameters, NewPieceCommitment, padded_size, unpadded_size};
use crate::status::{CommitmentStatus, ConnectionMode};
use crate::types::{ContentAddress, ContentId, MinerAddress, PieceCid, WalletAddress};

/// Furthest a client may push the start epoch, in days.
pub const MAX_START_EPOCH_DAYS: i64 = 14;

/// Highest replication count a single request may ask for.
pub const MAX_REPLICATION: u32 = 6;

/// Longest accepted deal label, in characters.
pub const MAX_LABEL_LENGTH: usize = 100;

/// Verification state marking a verified (datacap) deal.
pub const DEAL_VERIFIED: &str = "verified";

/// Verification state marking an unverified deal.
pub const DEAL_UNVERIFIED: &str = "unverified";

/// Reasons a deal request is rejected before any record is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid deal request")]
    Empty,

    #[error("start_epoch_in_days is required when duration_in_days is set")]
    StartEpochRequired,

    #[error("duration_in_days is required when start_epoch_in_days is set")]
    DurationRequired,

    #[error("start_epoch_in_days can only be 14 days or less")]
    StartEpochTooFar,

    #[error("replication count is more than allowed (6)")]
    ReplicationTooHigh,

    #[error("label length must be less than 100")]
    LabelTooLong,

    #[error("duration cannot be more than 540 days")]
    DurationTooLong,

    #[error("duration_in_days must be more than 7 days")]
    DurationTooShort,

    #[error("connection mode can only be e2e or import")]
    InvalidConnectionMode,

    #[error(
        "piece commitment is invalid, make sure you have the cid, piece_cid, size and padded_piece_size or unpadded_piece_size"
    )]
    InvalidPieceCommitment,

    #[error("wallet address is required")]
    MissingWalletAddress,

    #[error("miner is required")]
    MissingMiner,

    #[error("connection mode import is not supported on the end-to-end path")]
    ImportNotAllowed,

    #[error("connection mode e2e is not supported on the import path")]
    EndToEndNotAllowed,

    #[error("piece_commitment is required for import deals")]
    MissingPieceCommitment,
}

/// A piece commitment declared by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PieceCommitmentRequest {
    #[serde(rename = "piece_cid", skip_serializing_if = "Option::is_none")]
    pub piece: Option<PieceCid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padded_piece_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpadded_piece_size: Option<u64>,
}

/// Wallet to fund the deal from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<WalletAddress>,
}

/// A client's request to store content with a storage provider.
///
/// Zero numeric values are treated as "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<ContentAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miner: Option<MinerAddress>,
    /// Deal term in epochs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_commitment: Option<PieceCommitmentRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_mode: Option<String>,
    /// Payload size in bytes, for import deals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_epoch: Option<i64>,
    #[serde(alias = "start_epoch_at_days", skip_serializing_if = "Option::is_none")]
    pub start_epoch_in_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<u32>,
    pub remove_unsealed_copies: bool,
    pub skip_ipni_announce: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_verify_state: Option<String>,
}

fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

impl DealRequest {
    /// Whether the request carries no information at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Check the request against the deal rules.
    ///
    /// The first failing rule is reported. On success the effective
    /// connection mode is returned (`e2e` when none was given).
    pub fn validate(&self) -> Result<ConnectionMode, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::Empty);
        }

        let duration_days = positive(self.duration_in_days);
        let start_days = positive(self.start_epoch_in_days);
        match (duration_days, start_days) {
            (Some(_), None) => return Err(ValidationError::StartEpochRequired),
            (None, Some(_)) => return Err(ValidationError::DurationRequired),
            _ => {}
        }
        if start_days.is_some_and(|d| d > MAX_START_EPOCH_DAYS) {
            return Err(ValidationError::StartEpochTooFar);
        }
        if self.replication.is_some_and(|r| r > MAX_REPLICATION) {
            return Err(ValidationError::ReplicationTooHigh);
        }
        if self
            .label
            .as_ref()
            .is_some_and(|l| l.chars().count() > MAX_LABEL_LENGTH)
        {
            return Err(ValidationError::LabelTooLong);
        }
        if let Some(days) = duration_days {
            if days > MAX_DEAL_DURATION_DAYS {
                return Err(ValidationError::DurationTooLong);
            }
            if days <= SEALING_BUFFER_DAYS {
                return Err(ValidationError::DurationTooShort);
            }
        }
        if positive(self.duration).is_some_and(|d| d > DEFAULT_DEAL_DURATION_EPOCHS) {
            return Err(ValidationError::DurationTooLong);
        }

        let mode = self.connection_mode()?;

        if let Some(commitment) = &self.piece_commitment {
            if *commitment != PieceCommitmentRequest::default() {
                let has_piece = commitment.piece.as_ref().is_some_and(|p| !p.is_empty());
                if !has_piece || self.declared_sizes(commitment).is_none() {
                    return Err(ValidationError::InvalidPieceCommitment);
                }
            }
        }

        if self
            .wallet
            .as_ref()
            .and_then(|w| w.address.as_ref())
            .is_some_and(|a| a.is_empty())
        {
            return Err(ValidationError::MissingWalletAddress);
        }

        if self.miner.as_ref().is_none_or(|m| m.is_empty()) {
            return Err(ValidationError::MissingMiner);
        }

        Ok(mode)
    }

    /// Validate a request arriving with uploaded bytes.
    pub fn validate_end_to_end(&self) -> Result<(), ValidationError> {
        match self.validate()? {
            ConnectionMode::EndToEnd => Ok(()),
            ConnectionMode::Import => Err(ValidationError::ImportNotAllowed),
        }
    }

    /// Validate a request for data shipped out of band.
    pub fn validate_import(&self) -> Result<(), ValidationError> {
        match self.validate()? {
            ConnectionMode::Import => {}
            ConnectionMode::EndToEnd => return Err(ValidationError::EndToEndNotAllowed),
        }
        if self.declared_commitment().is_none() {
            return Err(ValidationError::MissingPieceCommitment);
        }
        Ok(())
    }

    /// Effective connection mode; absent or empty means end-to-end.
    pub fn connection_mode(&self) -> Result<ConnectionMode, ValidationError> {
        match self.connection_mode.as_deref() {
            None | Some("") => Ok(ConnectionMode::EndToEnd),
            Some(mode) => mode
                .parse()
                .map_err(|_| ValidationError::InvalidConnectionMode),
        }
    }

    /// Whether the deal is verified. Anything other than an explicit
    /// non-`verified` state counts as verified.
    pub fn is_verified(&self) -> bool {
        match self.deal_verify_state.as_deref() {
            None | Some("") => true,
            Some(state) => state == DEAL_VERIFIED,
        }
    }

    /// Piece commitment declared by the client, with missing sizes filled in.
    ///
    /// Returns `None` when no usable commitment was supplied.
    pub fn declared_commitment(&self) -> Option<NewPieceCommitment> {
        let commitment = self.piece_commitment.as_ref()?;
        let piece = commitment.piece.clone().filter(|p| !p.is_empty())?;
        let address = self.cid.clone().unwrap_or_else(|| ContentAddress::new(""));

        let (padded, unpadded) = self.declared_sizes(commitment)?;

        Some(NewPieceCommitment {
            address,
            piece,
            size: self.size.unwrap_or(unpadded),
            padded_piece_size: padded,
            unpadded_piece_size: unpadded,
            status: CommitmentStatus::Committed,
        })
    }

    /// Padded and unpadded piece sizes of a declared commitment, each
    /// missing one derived from the other or from the content size.
    ///
    /// `None` when no size is given or a derived size overflows.
    fn declared_sizes(&self, commitment: &PieceCommitmentRequest) -> Option<(u64, u64)> {
        match (
            commitment.padded_piece_size.filter(|s| *s > 0),
            commitment.unpadded_piece_size.filter(|s| *s > 0),
        ) {
            (Some(p), Some(u)) => Some((p, u)),
            (Some(p), None) => Some((p, unpadded_size(p))),
            (None, Some(u)) => Some((padded_size(u)?, u)),
            (None, None) => {
                let size = self.size.filter(|s| *s > 0)?;
                Some((padded_size(size)?, size))
            }
        }
    }

    /// Deal term in epochs.
    ///
    /// An explicit epoch count wins; a day count reserves the sealing buffer
    /// out of the requested term.
    pub fn duration_epochs(&self) -> i64 {
        if let Some(epochs) = positive(self.duration) {
            return epochs;
        }
        match positive(self.duration_in_days) {
            Some(days) => EPOCHS_PER_DAY * (days - SEALING_BUFFER_DAYS),
            None => DEFAULT_DEAL_DURATION_EPOCHS,
        }
    }

    /// Start epoch pinned by the request, evaluated at `now`.
    pub fn start_epoch_at(&self, now: DateTime<Utc>) -> Option<i64> {
        if let Some(days) = positive(self.start_epoch_in_days) {
            let start = now + Duration::days(days);
            return Some(date_to_height(start) + days_to_epochs(SEALING_BUFFER_DAYS));
        }
        positive(self.start_epoch)
    }

    /// Build the proposal parameters stored for a content.
    ///
    /// The request must already be validated; a missing counterparty is
    /// reported again here rather than assumed.
    pub fn proposal_parameters(
        &self,
        content_id: ContentId,
        address: &ContentAddress,
        now: DateTime<Utc>,
    ) -> Result<DealProposalParameters, ValidationError> {
        let miner = self
            .miner
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or(ValidationError::MissingMiner)?;
        let label = self
            .label
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| address.to_string());

        Ok(DealProposalParameters {
            content_id,
            miner,
            wallet: self
                .wallet
                .as_ref()
                .and_then(|w| w.address.clone())
                .filter(|a| !a.is_empty()),
            label,
            duration: self.duration_epochs(),
            start_epoch: self.start_epoch_at(now),
            verified_deal: self.is_verified(),
            remove_unsealed_copy: self.remove_unsealed_copies,
            skip_ipni_announce: self.skip_ipni_announce,
            replication: self.replication.unwrap_or(0),
        })
    }
}
