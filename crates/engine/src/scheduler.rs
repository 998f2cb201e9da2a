use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use delta_core::ContentStatus;
use delta_executor::RunSummary;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info};

use crate::admission::AdmissionControl;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::jobs::{DealMakerJob, LocalCopyRemovalJob, PieceCommitmentJob, TransferRestartJob};

/// Statuses re-entered through a fresh piece-commitment job.
const PIECE_RETRY_STATUSES: [ContentStatus; 3] = [
    ContentStatus::Pinned,
    ContentStatus::PieceComputing,
    ContentStatus::PieceComputingFailed,
];

/// Statuses re-entered through a fresh deal-maker job.
const DEAL_RETRY_STATUSES: [ContentStatus; 3] = [
    ContentStatus::PieceAssigned,
    ContentStatus::MakingDealProposal,
    ContentStatus::DealProposalFailed,
];

/// Configuration for the retry/cleanup scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cycles.
    pub interval: Duration,
    /// Age after which non-terminal content is considered stuck.
    pub stale_after: Duration,
    /// Age after which a proposed deal whose transfer never started is
    /// restarted.
    pub stalled_transfer_after: Duration,
    /// Workers draining each cycle's jobs.
    pub cleanup_workers: usize,
    /// Re-propose content whose transfer failed.
    pub retry_failed_transfers: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            stale_after: Duration::from_secs(60 * 60),
            stalled_transfer_after: Duration::from_secs(60 * 60),
            cleanup_workers: 10,
            retry_failed_transfers: false,
        }
    }
}

/// Jobs enqueued and executed by one scheduler cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub piece_commitments: usize,
    pub deal_proposals: usize,
    pub transfer_restarts: usize,
    pub removals: usize,
    pub summary: RunSummary,
}

impl CycleReport {
    /// Jobs enqueued directly by the cycle, follow-ups excluded.
    pub fn enqueued(&self) -> usize {
        self.piece_commitments + self.deal_proposals + self.transfer_restarts + self.removals
    }
}

/// Periodically re-enters stuck content, restarts stalled transfers and
/// retries pending local-copy removals.
///
/// Every cycle builds its own dispatcher and drains it before returning, so
/// cycles never overlap. Piece commitments get one attempt per cycle.
pub struct RetryScheduler {
    config: SchedulerConfig,
    ctx: Arc<EngineContext>,
    admission: Option<Arc<AdmissionControl>>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl RetryScheduler {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run cycles until shutdown is signaled.
    pub async fn run(&mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "retry scheduler starting"
        );
        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("retry scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "error running retry cycle");
                    }
                }
            }
        }

        info!("retry scheduler stopped");
    }

    /// Run one cycle now.
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with age thresholds measured from `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let store = &self.ctx.store;
        let dispatcher = self.ctx.new_dispatcher();
        let mut report = CycleReport::default();

        let stale_before = age_cutoff(now, self.config.stale_after);

        for content in store
            .list_contents_in_status(&PIECE_RETRY_STATUSES, stale_before)
            .await?
        {
            // A failure waits for the next cycle so one cycle stays bounded.
            dispatcher.enqueue(
                PieceCommitmentJob::new(Arc::clone(&self.ctx), dispatcher.clone(), content.id)
                    .without_requeue(),
            );
            report.piece_commitments += 1;
        }

        let mut deal_statuses = DEAL_RETRY_STATUSES.to_vec();
        if self.config.retry_failed_transfers {
            deal_statuses.push(ContentStatus::TransferFailed);
        }
        for content in store
            .list_contents_in_status(&deal_statuses, stale_before)
            .await?
        {
            dispatcher.enqueue(DealMakerJob::new(Arc::clone(&self.ctx), content.id));
            report.deal_proposals += 1;
        }

        let stalled_before = age_cutoff(now, self.config.stalled_transfer_after);
        for deal in store.list_stalled_deals(stalled_before).await? {
            dispatcher.enqueue(TransferRestartJob::new(
                Arc::clone(&self.ctx),
                dispatcher.clone(),
                deal.id,
            ));
            report.transfer_restarts += 1;
        }

        for removal in store.list_pending_removals().await? {
            dispatcher.enqueue(LocalCopyRemovalJob::new(Arc::clone(&self.ctx), removal));
            report.removals += 1;
        }

        report.summary = dispatcher.run(self.config.cleanup_workers).await;

        if let Some(admission) = &self.admission {
            admission.sample();
        }

        info!(
            piece_commitments = report.piece_commitments,
            deal_proposals = report.deal_proposals,
            transfer_restarts = report.transfer_restarts,
            removals = report.removals,
            executed = report.summary.executed,
            failed = report.summary.failed,
            "retry cycle finished"
        );
        Ok(report)
    }
}

fn age_cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Builder for creating a retry scheduler.
pub struct RetrySchedulerBuilder {
    config: SchedulerConfig,
    ctx: Option<Arc<EngineContext>>,
    admission: Option<Arc<AdmissionControl>>,
}

impl RetrySchedulerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            ctx: None,
            admission: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the shared engine context.
    #[must_use]
    pub fn context(mut self, ctx: Arc<EngineContext>) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Re-sample host resources after every cycle.
    #[must_use]
    pub fn admission(mut self, admission: Arc<AdmissionControl>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Build the scheduler.
    ///
    /// Returns the scheduler and a shutdown sender.
    pub fn build(self) -> Result<(RetryScheduler, mpsc::Sender<()>), EngineError> {
        let ctx = self
            .ctx
            .ok_or_else(|| EngineError::Configuration("engine context is required".into()))?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Ok((
            RetryScheduler {
                config: self.config,
                ctx,
                admission: self.admission,
                shutdown_rx,
            },
            shutdown_tx,
        ))
    }
}

impl Default for RetrySchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
