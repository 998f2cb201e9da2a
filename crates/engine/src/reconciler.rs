use std::sync::Arc;

use chrono::Utc;
use delta_core::{
    ChannelStateUpdate, ChannelTransition, ContentDealId, ContentId, ContentStatus,
    DataTransferEvent, MESSAGE_TRANSFER_FINISHED, MESSAGE_TRANSFER_STARTED, TransferEvent,
    TransferId,
};
use delta_executor::Dispatcher;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::jobs::LocalCopyRemovalJob;

/// What a transfer event did to the deal it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The counterparty accepted the transfer.
    Started,
    /// The transfer completed; the content is stored.
    Finished,
    /// The transfer failed authoritatively.
    Failed,
    /// A transport-level error was logged without touching the deal.
    Logged,
    /// The event carried no lifecycle change, or the deal is already
    /// terminal.
    Ignored,
}

/// Turns transport events into durable deal and content transitions.
///
/// Events for different deals are handled concurrently; events for the
/// same deal are serialised by the deal's lock in
/// [`DealLocks`](crate::DealLocks), held across the read-modify-write.
pub struct Reconciler {
    ctx: Arc<EngineContext>,
    dispatcher: Dispatcher,
}

impl Reconciler {
    /// Create a reconciler that enqueues local-copy removals on
    /// `dispatcher`.
    pub fn new(ctx: Arc<EngineContext>, dispatcher: Dispatcher) -> Self {
        Self { ctx, dispatcher }
    }

    /// Route future events of `transfer` to `deal`.
    pub fn register(&self, transfer: TransferId, deal: ContentDealId) {
        self.ctx.registry.register(transfer, deal);
    }

    /// Apply one event.
    #[instrument(skip_all, fields(transfer_id = %event.transfer_id()))]
    pub async fn handle(&self, event: TransferEvent) -> Result<ReconcileOutcome, EngineError> {
        match event {
            TransferEvent::ChannelState(update) => self.handle_channel_state(update).await,
            TransferEvent::DataTransfer(event) => self.handle_data_transfer(event).await,
        }
    }

    async fn handle_channel_state(
        &self,
        update: ChannelStateUpdate,
    ) -> Result<ReconcileOutcome, EngineError> {
        let transition = update.status.transition();
        if transition == ChannelTransition::Progress {
            debug!(deal_id = %update.deal_id, status = ?update.status, "transfer progress");
            return Ok(ReconcileOutcome::Ignored);
        }

        let _guard = self.ctx.deal_locks.lock(update.deal_id).await;

        let store = &self.ctx.store;
        let Some(mut deal) = store.get_deal(update.deal_id).await? else {
            return Err(EngineError::DealNotFound(update.deal_id));
        };
        if deal.is_terminal() {
            debug!(deal_id = %deal.id, status = ?update.status, "deal already terminal");
            return Ok(ReconcileOutcome::Ignored);
        }

        let now = Utc::now();
        let outcome = match transition {
            ChannelTransition::Started => {
                if deal.transfer_id.is_none() {
                    deal.transfer_id = Some(update.transfer_id.clone());
                }
                deal.mark_transfer_started(now, MESSAGE_TRANSFER_STARTED);
                store.update_deal(&deal).await?;
                info!(deal_id = %deal.id, content_id = %deal.content_id, "transfer started");
                ReconcileOutcome::Started
            }
            ChannelTransition::Finished => {
                let on_chain_deal_id = update.transfer_id.as_deal_id();
                if on_chain_deal_id.is_none() {
                    warn!(
                        deal_id = %deal.id,
                        transfer_id = %update.transfer_id,
                        "transfer id does not carry an on-chain deal id"
                    );
                }
                deal.mark_transfer_finished(now, on_chain_deal_id, MESSAGE_TRANSFER_FINISHED);
                store.update_deal(&deal).await?;
                self.transition_content(
                    deal.content_id,
                    ContentStatus::TransferFinished,
                    MESSAGE_TRANSFER_FINISHED,
                )
                .await;
                info!(
                    deal_id = %deal.id,
                    content_id = %deal.content_id,
                    on_chain_deal_id = ?on_chain_deal_id,
                    "transfer finished"
                );
                ReconcileOutcome::Finished
            }
            ChannelTransition::Failed => {
                let message = if update.message.is_empty() {
                    format!("transfer {:?}", update.status)
                } else {
                    update.message.clone()
                };
                deal.mark_failed(now, message.as_str());
                store.update_deal(&deal).await?;
                self.transition_content(deal.content_id, ContentStatus::TransferFailed, &message)
                    .await;
                warn!(
                    deal_id = %deal.id,
                    content_id = %deal.content_id,
                    status = ?update.status,
                    message = %message,
                    "transfer failed"
                );
                ReconcileOutcome::Failed
            }
            ChannelTransition::Progress => ReconcileOutcome::Ignored,
        };

        if matches!(
            outcome,
            ReconcileOutcome::Finished | ReconcileOutcome::Failed
        ) {
            self.schedule_removal(deal.content_id).await?;
            self.ctx.registry.forget(&update.transfer_id);
            if let Some(transfer) = &deal.transfer_id {
                self.ctx.registry.forget(transfer);
            }
            self.ctx.deal_locks.forget(deal.id);
        }
        Ok(outcome)
    }

    async fn handle_data_transfer(
        &self,
        event: DataTransferEvent,
    ) -> Result<ReconcileOutcome, EngineError> {
        let deal_id = match self.ctx.registry.lookup(&event.transfer_id) {
            Some(id) => Some(id),
            None => self
                .ctx
                .store
                .find_deal_by_transfer_id(&event.transfer_id)
                .await?
                .map(|deal| deal.id),
        };

        if event.code.is_transport_error() {
            warn!(
                deal_id = ?deal_id,
                code = ?event.code,
                message = %event.message,
                "data transfer error"
            );
            Ok(ReconcileOutcome::Logged)
        } else {
            debug!(deal_id = ?deal_id, code = ?event.code, "data transfer event");
            Ok(ReconcileOutcome::Ignored)
        }
    }

    /// Move the content of a deal that just turned terminal.
    ///
    /// The deal is already written, so a refused edge (the content moved on
    /// through another deal) is logged and the local copy is still removed.
    async fn transition_content(&self, content_id: ContentId, to: ContentStatus, message: &str) {
        if let Err(e) = self
            .ctx
            .store
            .transition_content(content_id, to, Some(message))
            .await
        {
            warn!(content_id = %content_id, to = %to, error = %e, "content transition refused");
        }
    }

    async fn schedule_removal(&self, content_id: ContentId) -> Result<(), EngineError> {
        let content = self
            .ctx
            .store
            .get_content(content_id)
            .await?
            .ok_or(EngineError::ContentNotFound(content_id))?;
        let removal = self
            .ctx
            .store
            .schedule_removal(content_id, &content.address)
            .await?;
        self.dispatcher
            .enqueue(LocalCopyRemovalJob::new(Arc::clone(&self.ctx), removal));
        Ok(())
    }

    /// Consume events until `shutdown` fires or the event channel closes.
    ///
    /// Each event is handled on its own task; in-flight handlers are awaited
    /// before returning.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<TransferEvent>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        info!("transfer reconciler starting");
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("transfer reconciler received shutdown signal");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("transfer event channel closed");
                        break;
                    };
                    let this = Arc::clone(&self);
                    tracker.spawn(async move {
                        let transfer_id = event.transfer_id().clone();
                        if let Err(e) = this.handle(event).await {
                            warn!(transfer_id = %transfer_id, error = %e, "failed to reconcile transfer event");
                        }
                    });
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        info!("transfer reconciler stopped");
    }
}
