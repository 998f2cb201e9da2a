use async_trait::async_trait;
use delta_core::{ChannelStatus, TransferId};

use crate::error::ProviderError;

/// Current state of a data-transfer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    pub status: ChannelStatus,
    pub message: String,
}

/// Control surface of the data-transfer transport.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Look up a channel. `None` when the transport has no record of it.
    async fn transfer_status(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferState>, ProviderError>;

    /// Ask the transport to resume a stalled channel.
    async fn restart_transfer(&self, transfer_id: &TransferId) -> Result<(), ProviderError>;
}
