use std::sync::Arc;

use chrono::Utc;
use delta_core::{
    ApiKey, Content, ContentAddress, ContentDeal, ContentDealId, ContentId, ContentStatus,
    ConnectionMode, DealRequest, NewContent, PieceCommitment, PieceCommitmentId, ValidationError,
};
use delta_executor::{Dispatcher, ExecutorConfig, RunSummary};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::admission::AdmissionControl;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::jobs::{DealMakerJob, PieceCommitmentJob, TransferRestartJob};
use crate::reconciler::Reconciler;
use crate::scheduler::{RetrySchedulerBuilder, SchedulerConfig};

/// Bytes received from a client and already placed in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub name: String,
    pub address: ContentAddress,
    pub size: u64,
}

/// A request to store content with a storage provider.
///
/// End-to-end submissions reference bytes held locally, either freshly
/// uploaded or already stored under `request.cid`. Import submissions only
/// describe data shipped to the provider out of band and must declare its
/// piece commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealSubmission {
    pub request: DealRequest,
    pub api_key: ApiKey,
    #[serde(default)]
    pub upload: Option<Upload>,
}

/// Records created by an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedContent {
    pub content: Content,
    pub piece_commitment: Option<PieceCommitment>,
    pub connection_mode: ConnectionMode,
}

/// Everything known about one content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentStatusReport {
    pub content: Content,
    pub piece_commitment: Option<PieceCommitment>,
    pub deals: Vec<ContentDeal>,
}

/// Entry point of the deal lifecycle.
///
/// Owns the main dispatcher, the transfer reconciler and admission control.
/// Build one with [`EngineBuilder`](crate::EngineBuilder).
pub struct Engine {
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) admission: Arc<AdmissionControl>,
    pub(crate) executor_config: ExecutorConfig,
}

impl Engine {
    /// Validate a submission, store its content and start the lifecycle.
    ///
    /// Nothing is written when validation or admission fails. The first job
    /// is enqueued on the main dispatcher; it runs on the next
    /// [`run_pending`](Self::run_pending).
    #[instrument(skip_all)]
    pub async fn submit(&self, submission: DealSubmission) -> Result<SubmittedContent, EngineError> {
        let DealSubmission {
            request,
            api_key,
            upload,
        } = submission;

        let mode = request.validate()?;
        if mode == ConnectionMode::Import {
            request.validate_import()?;
        }

        self.admission.check(self.ctx.store.as_ref()).await?;

        let store = &self.ctx.store;
        let (content, commitment) = match mode {
            ConnectionMode::EndToEnd => {
                let (name, address, size) = match upload {
                    Some(upload) => (upload.name, upload.address, upload.size),
                    None => {
                        let address = request
                            .cid
                            .clone()
                            .filter(|cid| !cid.is_empty())
                            .ok_or(EngineError::MissingContent)?;
                        (address.to_string(), address, request.size.unwrap_or(0))
                    }
                };
                let new_content = NewContent {
                    address: address.clone(),
                    name,
                    size,
                    requesting_api_key: api_key,
                    connection_mode: mode,
                    status: ContentStatus::Pinned,
                };
                match request.declared_commitment() {
                    Some(mut commitment) => {
                        commitment.address = address;
                        let (content, commitment) = store
                            .create_content_with_commitment(new_content, commitment)
                            .await?;
                        (content, Some(commitment))
                    }
                    None => (store.create_content(new_content).await?, None),
                }
            }
            ConnectionMode::Import => {
                let address = request
                    .cid
                    .clone()
                    .filter(|cid| !cid.is_empty())
                    .ok_or(EngineError::MissingContent)?;
                let commitment = request
                    .declared_commitment()
                    .ok_or(ValidationError::MissingPieceCommitment)?;
                let new_content = NewContent {
                    address: address.clone(),
                    name: address.to_string(),
                    size: request.size.unwrap_or(commitment.size),
                    requesting_api_key: api_key,
                    connection_mode: mode,
                    status: ContentStatus::MakingDealProposal,
                };
                let (content, commitment) = store
                    .create_content_with_commitment(new_content, commitment)
                    .await?;
                (content, Some(commitment))
            }
        };

        let params = request.proposal_parameters(content.id, &content.address, Utc::now())?;
        store.save_proposal_parameters(&params).await?;

        match &commitment {
            Some(commitment) => self.dispatcher.enqueue(
                DealMakerJob::new(Arc::clone(&self.ctx), content.id)
                    .with_commitment(commitment.id),
            ),
            None => self.dispatcher.enqueue(PieceCommitmentJob::new(
                Arc::clone(&self.ctx),
                self.dispatcher.clone(),
                content.id,
            )),
        }

        info!(
            content_id = %content.id,
            address = %content.address,
            mode = %mode,
            miner = %params.miner,
            "content submitted"
        );

        Ok(SubmittedContent {
            content,
            piece_commitment: commitment,
            connection_mode: mode,
        })
    }

    /// Content, piece commitment and deals of one content.
    pub async fn content_status(&self, id: ContentId) -> Result<ContentStatusReport, EngineError> {
        let store = &self.ctx.store;
        let content = store
            .get_content(id)
            .await?
            .ok_or(EngineError::ContentNotFound(id))?;
        let piece_commitment = match content.piece_commitment_id {
            Some(commitment_id) => store.get_piece_commitment(commitment_id).await?,
            None => None,
        };
        let deals = store.list_deals_for_content(id).await?;
        Ok(ContentStatusReport {
            content,
            piece_commitment,
            deals,
        })
    }

    pub async fn piece_commitment(
        &self,
        id: PieceCommitmentId,
    ) -> Result<PieceCommitment, EngineError> {
        self.ctx
            .store
            .get_piece_commitment(id)
            .await?
            .ok_or(EngineError::CommitmentNotFound(id))
    }

    /// Queue a restart of a deal's data transfer.
    pub fn restart_transfer(&self, deal_id: ContentDealId) {
        self.dispatcher.enqueue(TransferRestartJob::new(
            Arc::clone(&self.ctx),
            self.dispatcher.clone(),
            deal_id,
        ));
    }

    /// Drain the main dispatcher with the configured worker count.
    pub async fn run_pending(&self) -> RunSummary {
        self.dispatcher.run(self.executor_config.workers).await
    }

    /// A scheduler builder wired to this engine.
    pub fn scheduler(&self, config: SchedulerConfig) -> RetrySchedulerBuilder {
        RetrySchedulerBuilder::new()
            .config(config)
            .context(Arc::clone(&self.ctx))
            .admission(Arc::clone(&self.admission))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn executor_config(&self) -> &ExecutorConfig {
        &self.executor_config
    }
}
