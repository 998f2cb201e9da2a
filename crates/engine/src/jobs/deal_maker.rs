use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use delta_core::{ContentId, ContentStatus, NewContentDeal, PieceCommitmentId};
use delta_executor::{Job, JobError};
use delta_provider::ProposalRequest;
use delta_state::StateError;
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;
use crate::error::EngineError;

/// Proposes a storage deal for a content whose piece commitment is known.
///
/// Every run creates a new deal record. A rejected proposal fails that deal
/// and moves the content to `deal-proposal-failed`, where the scheduler
/// picks it up again.
pub struct DealMakerJob {
    ctx: Arc<EngineContext>,
    content_id: ContentId,
    commitment_id: Option<PieceCommitmentId>,
}

impl DealMakerJob {
    pub fn new(ctx: Arc<EngineContext>, content_id: ContentId) -> Self {
        Self {
            ctx,
            content_id,
            commitment_id: None,
        }
    }

    /// Use this commitment instead of the one referenced by the content.
    #[must_use]
    pub fn with_commitment(mut self, commitment_id: PieceCommitmentId) -> Self {
        self.commitment_id = Some(commitment_id);
        self
    }

    async fn run(&self) -> Result<(), EngineError> {
        let store = &self.ctx.store;
        let content = store
            .get_content(self.content_id)
            .await?
            .ok_or(EngineError::ContentNotFound(self.content_id))?;

        let commitment_id = self
            .commitment_id
            .or(content.piece_commitment_id)
            .ok_or(EngineError::MissingCommitment(self.content_id))?;
        let commitment = store
            .get_piece_commitment(commitment_id)
            .await?
            .ok_or(EngineError::CommitmentNotFound(commitment_id))?;
        let params = store
            .get_proposal_parameters(self.content_id)
            .await?
            .ok_or(EngineError::MissingProposal(self.content_id))?;

        let content = store
            .transition_content(self.content_id, ContentStatus::MakingDealProposal, None)
            .await?;

        let deal = store
            .create_deal(NewContentDeal {
                content_id: content.id,
                miner: params.miner.clone(),
                proposal: params,
            })
            .await?;

        let proposed = self
            .ctx
            .proposer
            .propose(ProposalRequest {
                content: &content,
                commitment: &commitment,
                deal: &deal,
            })
            .await;

        // Transfer events for this deal may have arrived while the proposal
        // was in flight. Re-read under the deal lock and only add what this
        // job owns.
        let _guard = self.ctx.deal_locks.lock(deal.id).await;
        let mut current = store
            .get_deal(deal.id)
            .await?
            .ok_or(EngineError::DealNotFound(deal.id))?;

        match proposed {
            Ok(transfer_id) => {
                if current.is_terminal() {
                    debug!(deal_id = %deal.id, "deal finished before the proposal returned");
                    self.ctx.deal_locks.forget(deal.id);
                } else {
                    if current.transfer_id.is_none() {
                        current.transfer_id = Some(transfer_id.clone());
                        current.updated_at = Utc::now();
                        store.update_deal(&current).await?;
                    }
                    self.ctx.registry.register(transfer_id.clone(), deal.id);
                }

                info!(
                    content_id = %content.id,
                    deal_id = %deal.id,
                    transfer_id = %transfer_id,
                    miner = %deal.miner,
                    "deal proposal sent"
                );

                match store
                    .transition_content(content.id, ContentStatus::DealProposalSent, None)
                    .await
                {
                    // Transfer events may have moved the content on already.
                    Err(StateError::Transition(e)) => {
                        debug!(content_id = %content.id, error = %e, "content already advanced");
                        Ok(())
                    }
                    other => other.map(|_| ()).map_err(Into::into),
                }
            }
            Err(e) => {
                let message = e.to_string();
                if current.is_terminal() {
                    debug!(deal_id = %deal.id, "deal already terminal");
                } else {
                    current.mark_failed(Utc::now(), message.as_str());
                    store.update_deal(&current).await?;
                    store
                        .transition_content(
                            content.id,
                            ContentStatus::DealProposalFailed,
                            Some(&message),
                        )
                        .await?;
                }
                self.ctx.deal_locks.forget(deal.id);
                warn!(
                    content_id = %content.id,
                    deal_id = %deal.id,
                    error = %e,
                    "deal proposal failed"
                );
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Job for DealMakerJob {
    fn name(&self) -> &'static str {
        "deal-maker"
    }

    fn describe(&self) -> String {
        format!("content {}", self.content_id)
    }

    #[instrument(skip_all, fields(content_id = %self.content_id))]
    async fn execute(self: Box<Self>) -> Result<(), JobError> {
        self.run().await.map_err(Into::into)
    }
}
