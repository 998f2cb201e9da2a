use std::sync::Arc;

use async_trait::async_trait;
use delta_core::{ContentDealId, TransferId};
use delta_executor::{Job, JobError};
use tracing::debug;

use crate::context::EngineContext;

/// Starts routing events of a transfer to its deal.
pub struct RegisterTransferJob {
    ctx: Arc<EngineContext>,
    deal_id: ContentDealId,
    transfer_id: TransferId,
}

impl RegisterTransferJob {
    pub fn new(ctx: Arc<EngineContext>, deal_id: ContentDealId, transfer_id: TransferId) -> Self {
        Self {
            ctx,
            deal_id,
            transfer_id,
        }
    }
}

#[async_trait]
impl Job for RegisterTransferJob {
    fn name(&self) -> &'static str {
        "register-transfer"
    }

    fn describe(&self) -> String {
        format!("deal {} transfer {}", self.deal_id, self.transfer_id)
    }

    async fn execute(self: Box<Self>) -> Result<(), JobError> {
        debug!(deal_id = %self.deal_id, transfer_id = %self.transfer_id, "transfer registered");
        self.ctx.registry.register(self.transfer_id, self.deal_id);
        Ok(())
    }
}
