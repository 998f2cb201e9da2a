use std::sync::Arc;

use async_trait::async_trait;
use delta_core::ContentDealId;
use delta_executor::{Dispatcher, Job, JobError};
use tracing::{debug, info, instrument};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::jobs::RegisterTransferJob;

/// Restarts the data transfer of a deal that stalled.
///
/// A transfer the transport no longer knows about is reported as
/// [`EngineError::NoTransferState`] and not retried here.
pub struct TransferRestartJob {
    ctx: Arc<EngineContext>,
    dispatcher: Dispatcher,
    deal_id: ContentDealId,
}

impl TransferRestartJob {
    pub fn new(ctx: Arc<EngineContext>, dispatcher: Dispatcher, deal_id: ContentDealId) -> Self {
        Self {
            ctx,
            dispatcher,
            deal_id,
        }
    }

    async fn run(&self) -> Result<(), EngineError> {
        let deal = self
            .ctx
            .store
            .get_deal(self.deal_id)
            .await?
            .ok_or(EngineError::DealNotFound(self.deal_id))?;
        let transfer_id = deal
            .transfer_id
            .clone()
            .ok_or(EngineError::MissingTransferId(self.deal_id))?;

        let state = self
            .ctx
            .transfers
            .transfer_status(&transfer_id)
            .await?
            .ok_or_else(|| EngineError::NoTransferState(transfer_id.clone()))?;
        debug!(
            deal_id = %self.deal_id,
            transfer_id = %transfer_id,
            status = ?state.status,
            "restarting transfer"
        );

        self.ctx.transfers.restart_transfer(&transfer_id).await?;
        info!(deal_id = %self.deal_id, transfer_id = %transfer_id, "transfer restarted");

        self.dispatcher.enqueue(RegisterTransferJob::new(
            Arc::clone(&self.ctx),
            self.deal_id,
            transfer_id,
        ));
        Ok(())
    }
}

#[async_trait]
impl Job for TransferRestartJob {
    fn name(&self) -> &'static str {
        "transfer-restart"
    }

    fn describe(&self) -> String {
        format!("deal {}", self.deal_id)
    }

    #[instrument(skip_all, fields(deal_id = %self.deal_id))]
    async fn execute(self: Box<Self>) -> Result<(), JobError> {
        self.run().await.map_err(Into::into)
    }
}
