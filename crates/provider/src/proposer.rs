use async_trait::async_trait;
use delta_core::{Content, ContentDeal, PieceCommitment, TransferId};

use crate::error::ProviderError;

/// Everything transmitted with a storage deal proposal.
///
/// The counterparty and the proposal parameters travel on the deal record;
/// its id is the local deal id the transport reports back with.
#[derive(Debug, Clone, Copy)]
pub struct ProposalRequest<'a> {
    pub content: &'a Content,
    pub commitment: &'a PieceCommitment,
    pub deal: &'a ContentDeal,
}

/// Sends deal proposals to storage providers.
#[async_trait]
pub trait DealProposer: Send + Sync {
    /// Transmit a proposal and return the transfer identifier the transport
    /// assigned to it.
    async fn propose(&self, request: ProposalRequest<'_>) -> Result<TransferId, ProviderError>;
}
