use std::sync::Arc;

use delta_core::TransferEvent;
use delta_engine::{Engine, EngineBuilder, SchedulerConfig};
use delta_executor::DeadLetterQueue;
use delta_provider::{FsContentStore, LogTransport};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::DeltaConfig;
use crate::error::NodeError;
use crate::state_factory;

/// Capacity of the inbound transfer event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Build an engine from configuration.
///
/// Local copies live in a filesystem content store. Proposals and transfer
/// control go through [`LogTransport`], which records what would be sent.
pub async fn build_engine(config: &DeltaConfig) -> Result<Engine, NodeError> {
    let store = state_factory::create_store(&config.state).await?;
    let content = Arc::new(FsContentStore::new(config.content_store.path.clone()));
    let transport = Arc::new(LogTransport::new("delta"));

    let engine = EngineBuilder::new()
        .store(store)
        .content_store(content)
        .proposer(transport.clone())
        .transfer_client(transport)
        .executor_config(config.dispatcher.executor_config())
        .bytes_per_cpu(config.resources.bytes_per_cpu)
        .dead_letters(Arc::new(DeadLetterQueue::bounded(
            config.dispatcher.dead_letter_capacity,
        )))
        .build()?;
    Ok(engine)
}

/// The long-running loops of a node: transfer reconciliation, the main
/// dispatcher pump and, optionally, the retry scheduler.
pub struct Node;

impl Node {
    /// Spawn the node's loops around `engine`.
    pub fn start(
        engine: Arc<Engine>,
        scheduler: Option<SchedulerConfig>,
    ) -> Result<NodeHandle, NodeError> {
        let tracker = TaskTracker::new();
        let mut shutdown = Vec::new();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (reconciler_tx, reconciler_rx) = mpsc::channel(1);
        tracker.spawn(Arc::clone(engine.reconciler()).run(events_rx, reconciler_rx));
        shutdown.push(reconciler_tx);

        let (pump_tx, pump_rx) = mpsc::channel(1);
        tracker.spawn(pump(Arc::clone(&engine), pump_rx));
        shutdown.push(pump_tx);

        if let Some(config) = scheduler {
            let (mut scheduler, scheduler_tx) = engine.scheduler(config).build()?;
            tracker.spawn(async move { scheduler.run().await });
            shutdown.push(scheduler_tx);
        }

        tracker.close();
        info!(loops = shutdown.len(), "node started");
        Ok(NodeHandle {
            engine,
            events: events_tx,
            shutdown,
            tracker,
        })
    }
}

/// Drain the main dispatcher whenever work arrives.
async fn pump(engine: Arc<Engine>, mut shutdown: mpsc::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("dispatch pump received shutdown signal");
                break;
            }
            () = engine.dispatcher().wait_for_work() => {
                engine.run_pending().await;
            }
        }
    }
}

/// Handle to a running node.
pub struct NodeHandle {
    engine: Arc<Engine>,
    events: mpsc::Sender<TransferEvent>,
    shutdown: Vec<mpsc::Sender<()>>,
    tracker: TaskTracker,
}

impl NodeHandle {
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Sender for transport events; the reconciler consumes them.
    pub fn events(&self) -> mpsc::Sender<TransferEvent> {
        self.events.clone()
    }

    /// Signal every loop to stop and wait for them to finish.
    ///
    /// A dispatcher drain or scheduler cycle already in progress completes
    /// first.
    pub async fn shutdown(self) {
        for tx in &self.shutdown {
            let _ = tx.send(()).await;
        }
        drop(self.events);
        self.tracker.wait().await;
        info!("node stopped");
    }
}
