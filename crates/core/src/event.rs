//! Inbound transport events.
//!
//! The transport reports progress on two streams: channel-state updates,
//! already keyed by the local deal id, and lower-level data-transfer events
//! that only carry the transfer id.

use serde::{Deserialize, Serialize};

use crate::types::{ContentDealId, TransferId};

/// Status of a data-transfer channel as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelStatus {
    Requested,
    Ongoing,
    TransferFinished,
    ResponderCompleted,
    FinalizingTransfer,
    Completing,
    Completed,
    Failing,
    Failed,
    Cancelling,
    Cancelled,
    InitiatorPaused,
    ResponderPaused,
    BothPaused,
    ResponderFinalizing,
    ResponderFinalizingTransferFinished,
    ChannelNotFoundError,
}

/// What a channel status means for the deal it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTransition {
    /// The counterparty accepted the transfer request.
    Started,
    /// The data reached the counterparty.
    Finished,
    /// The channel failed authoritatively.
    Failed,
    /// Intermediate progress with no lifecycle effect.
    Progress,
}

impl ChannelStatus {
    pub const fn transition(self) -> ChannelTransition {
        match self {
            Self::Requested => ChannelTransition::Started,
            Self::TransferFinished | Self::Completed => ChannelTransition::Finished,
            Self::Failed
            | Self::Failing
            | Self::Cancelled
            | Self::InitiatorPaused
            | Self::ResponderPaused
            | Self::ChannelNotFoundError => ChannelTransition::Failed,
            Self::Ongoing
            | Self::ResponderCompleted
            | Self::FinalizingTransfer
            | Self::Completing
            | Self::Cancelling
            | Self::BothPaused
            | Self::ResponderFinalizing
            | Self::ResponderFinalizingTransferFinished => ChannelTransition::Progress,
        }
    }
}

/// Code of a low-level data-transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataTransferEventCode {
    Open,
    Accept,
    Restart,
    DataReceived,
    DataSent,
    Progress,
    Complete,
    CleanupComplete,
    Error,
    Disconnected,
    ReceiveDataError,
    SendDataError,
    Cancel,
    RequestTimedOut,
}

impl DataTransferEventCode {
    /// Transport-level trouble that does not by itself decide the deal.
    pub const fn is_transport_error(self) -> bool {
        matches!(
            self,
            Self::Error
                | Self::Disconnected
                | Self::ReceiveDataError
                | Self::SendDataError
                | Self::Cancel
                | Self::RequestTimedOut
        )
    }
}

/// A channel-state update for a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStateUpdate {
    pub deal_id: ContentDealId,
    pub status: ChannelStatus,
    pub transfer_id: TransferId,
    #[serde(default)]
    pub message: String,
}

/// A low-level data-transfer event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTransferEvent {
    pub code: DataTransferEventCode,
    pub transfer_id: TransferId,
    #[serde(default)]
    pub message: String,
}

/// Any event delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferEvent {
    ChannelState(ChannelStateUpdate),
    DataTransfer(DataTransferEvent),
}

impl TransferEvent {
    pub fn transfer_id(&self) -> &TransferId {
        match self {
            Self::ChannelState(update) => &update.transfer_id,
            Self::DataTransfer(event) => &event.transfer_id,
        }
    }
}

impl From<ChannelStateUpdate> for TransferEvent {
    fn from(update: ChannelStateUpdate) -> Self {
        Self::ChannelState(update)
    }
}

impl From<DataTransferEvent> for TransferEvent {
    fn from(event: DataTransferEvent) -> Self {
        Self::DataTransfer(event)
    }
}
