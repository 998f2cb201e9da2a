use std::sync::Arc;

use async_trait::async_trait;
use delta_core::LocalCopyRemoval;
use delta_executor::{Job, JobError};
use tracing::{info, instrument, warn};

use crate::context::EngineContext;
use crate::error::EngineError;

/// Deletes the local copy of a content once its transfer is over.
///
/// The removal record is dropped on success. A failure is counted on the
/// record, which stays pending for the next scheduler cycle.
pub struct LocalCopyRemovalJob {
    ctx: Arc<EngineContext>,
    removal: LocalCopyRemoval,
}

impl LocalCopyRemovalJob {
    pub fn new(ctx: Arc<EngineContext>, removal: LocalCopyRemoval) -> Self {
        Self { ctx, removal }
    }

    async fn run(&self) -> Result<(), EngineError> {
        let removal = &self.removal;
        match self.ctx.content.remove(&removal.address).await {
            Ok(()) => {
                self.ctx.store.complete_removal(removal.id).await?;
                info!(
                    content_id = %removal.content_id,
                    address = %removal.address,
                    "local copy removed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    content_id = %removal.content_id,
                    address = %removal.address,
                    attempts = removal.attempts + 1,
                    error = %e,
                    "local copy removal failed"
                );
                self.ctx
                    .store
                    .record_removal_failure(removal.id, &e.to_string())
                    .await?;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Job for LocalCopyRemovalJob {
    fn name(&self) -> &'static str {
        "local-copy-removal"
    }

    fn describe(&self) -> String {
        format!("content {} removal {}", self.removal.content_id, self.removal.id)
    }

    #[instrument(skip_all, fields(content_id = %self.removal.content_id))]
    async fn execute(self: Box<Self>) -> Result<(), JobError> {
        self.run().await.map_err(Into::into)
    }
}
