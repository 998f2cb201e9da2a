use async_trait::async_trait;
use chrono::{DateTime, Utc};

use delta_core::{
    Content, ContentAddress, ContentDeal, ContentDealId, ContentId, ContentStatus,
    DealProposalParameters, LocalCopyRemoval, NewContent, NewContentDeal, NewPieceCommitment,
    PieceCommitment, PieceCommitmentId, RemovalId, TransferId,
};

use crate::error::StateError;

/// Durable source of truth for content, commitments, deals and pending
/// local-copy removals.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Every method is a single atomic unit: no caller holds a lock across
/// calls.
#[async_trait]
pub trait DealStore: Send + Sync {
    // -- Content -------------------------------------------------------------

    /// Insert a new content record and return it with its assigned id.
    async fn create_content(&self, content: NewContent) -> Result<Content, StateError>;

    /// Insert a content record together with its declared piece commitment.
    ///
    /// Both rows are written atomically and the content references the new
    /// commitment.
    async fn create_content_with_commitment(
        &self,
        content: NewContent,
        commitment: NewPieceCommitment,
    ) -> Result<(Content, PieceCommitment), StateError>;

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>, StateError>;

    /// Move a content record to `to`, validating the edge against the
    /// current status under the same atomic unit as the write.
    ///
    /// `message` becomes the content's last message; `None` records the
    /// status name.
    async fn transition_content(
        &self,
        id: ContentId,
        to: ContentStatus,
        message: Option<&str>,
    ) -> Result<Content, StateError>;

    /// Record a piece commitment for a content, point the content at it and
    /// move it to `piece-assigned`, all atomically.
    async fn attach_piece_commitment(
        &self,
        id: ContentId,
        commitment: NewPieceCommitment,
    ) -> Result<(Content, PieceCommitment), StateError>;

    /// Content in any of `statuses` last updated before `updated_before`.
    async fn list_contents_in_status(
        &self,
        statuses: &[ContentStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Content>, StateError>;

    /// Total size of content with a started, unfinished transfer.
    async fn bytes_in_transfer(&self) -> Result<u64, StateError>;

    // -- Piece commitments ---------------------------------------------------

    async fn get_piece_commitment(
        &self,
        id: PieceCommitmentId,
    ) -> Result<Option<PieceCommitment>, StateError>;

    // -- Proposal parameters -------------------------------------------------

    /// Store the proposal parameters of a content, replacing earlier ones.
    async fn save_proposal_parameters(
        &self,
        params: &DealProposalParameters,
    ) -> Result<(), StateError>;

    async fn get_proposal_parameters(
        &self,
        content_id: ContentId,
    ) -> Result<Option<DealProposalParameters>, StateError>;

    // -- Deals ---------------------------------------------------------------

    async fn create_deal(&self, deal: NewContentDeal) -> Result<ContentDeal, StateError>;

    async fn get_deal(&self, id: ContentDealId) -> Result<Option<ContentDeal>, StateError>;

    async fn find_deal_by_transfer_id(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<ContentDeal>, StateError>;

    /// Deals of a content, oldest first.
    async fn list_deals_for_content(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<ContentDeal>, StateError>;

    /// Overwrite the mutable fields of an existing deal.
    async fn update_deal(&self, deal: &ContentDeal) -> Result<(), StateError>;

    /// Deals with a transfer id whose transfer never started, last updated
    /// before `updated_before`.
    async fn list_stalled_deals(
        &self,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<ContentDeal>, StateError>;

    // -- Local copy removals -------------------------------------------------

    /// Record that the local copy of a content must be removed.
    ///
    /// Returns the already-pending removal for the content if one exists.
    async fn schedule_removal(
        &self,
        content_id: ContentId,
        address: &ContentAddress,
    ) -> Result<LocalCopyRemoval, StateError>;

    async fn list_pending_removals(&self) -> Result<Vec<LocalCopyRemoval>, StateError>;

    /// Drop a removal record once the copy is gone. Returns `true` if the
    /// record existed.
    async fn complete_removal(&self, id: RemovalId) -> Result<bool, StateError>;

    /// Count a failed removal attempt and keep the record pending.
    async fn record_removal_failure(&self, id: RemovalId, error: &str) -> Result<(), StateError>;
}
