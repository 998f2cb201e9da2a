use std::sync::Arc;

use async_trait::async_trait;
use delta_core::{CommitmentStatus, ContentId, ContentStatus, NewPieceCommitment};
use delta_executor::{Dispatcher, Job, JobError};
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::jobs::DealMakerJob;

/// Computes the piece commitment of a content and hands it to the deal
/// maker.
///
/// A failed derivation leaves the content in `piece-computing-failed` and
/// enqueues a fresh instance with the next attempt number, delayed by the
/// retry policy, until the policy gives up. Jobs built with
/// [`without_requeue`](Self::without_requeue) make a single attempt.
pub struct PieceCommitmentJob {
    ctx: Arc<EngineContext>,
    dispatcher: Dispatcher,
    content_id: ContentId,
    attempt: u32,
    requeue: bool,
}

impl PieceCommitmentJob {
    pub fn new(ctx: Arc<EngineContext>, dispatcher: Dispatcher, content_id: ContentId) -> Self {
        Self {
            ctx,
            dispatcher,
            content_id,
            attempt: 0,
            requeue: true,
        }
    }

    /// Leave a failed derivation in `piece-computing-failed` instead of
    /// enqueueing the next attempt.
    #[must_use]
    pub fn without_requeue(mut self) -> Self {
        self.requeue = false;
        self
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn next_attempt(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            dispatcher: self.dispatcher.clone(),
            content_id: self.content_id,
            attempt: self.attempt + 1,
            requeue: self.requeue,
        }
    }

    async fn run(&self) -> Result<(), EngineError> {
        let delay = self.ctx.retry.delay_before(self.attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let store = &self.ctx.store;
        let content = store
            .transition_content(self.content_id, ContentStatus::PieceComputing, None)
            .await?;

        let derived = match self
            .ctx
            .deriver
            .derive(&content.address, self.ctx.content.as_ref())
            .await
        {
            Ok(derived) => derived,
            Err(e) => {
                let message = e.to_string();
                store
                    .transition_content(
                        self.content_id,
                        ContentStatus::PieceComputingFailed,
                        Some(&message),
                    )
                    .await?;

                let attempts_made = self.attempt + 1;
                if !self.requeue {
                    debug!(content_id = %self.content_id, "piece commitment left for a later cycle");
                } else if self.ctx.retry.allows_another(attempts_made) {
                    self.dispatcher.enqueue(self.next_attempt());
                } else {
                    warn!(
                        content_id = %self.content_id,
                        attempts = attempts_made,
                        "piece commitment attempts exhausted"
                    );
                }
                return Err(e.into());
            }
        };

        let commitment = NewPieceCommitment {
            address: content.address.clone(),
            piece: derived.piece.clone(),
            size: derived.payload_size,
            padded_piece_size: derived.padded_piece_size,
            unpadded_piece_size: derived.unpadded_piece_size,
            status: CommitmentStatus::Open,
        };
        let (content, commitment) = store
            .attach_piece_commitment(self.content_id, commitment)
            .await?;

        info!(
            content_id = %content.id,
            piece = %commitment.piece,
            padded_piece_size = commitment.padded_piece_size,
            "piece commitment assigned"
        );

        self.dispatcher.enqueue(
            DealMakerJob::new(Arc::clone(&self.ctx), content.id).with_commitment(commitment.id),
        );
        Ok(())
    }
}

#[async_trait]
impl Job for PieceCommitmentJob {
    fn name(&self) -> &'static str {
        "piece-commitment"
    }

    fn describe(&self) -> String {
        format!("content {} attempt {}", self.content_id, self.attempt)
    }

    #[instrument(skip_all, fields(content_id = %self.content_id, attempt = self.attempt))]
    async fn execute(self: Box<Self>) -> Result<(), JobError> {
        self.run().await.map_err(Into::into)
    }
}
