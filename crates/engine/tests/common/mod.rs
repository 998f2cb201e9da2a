//! Shared harness for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use delta_core::{
    ApiKey, ChannelStateUpdate, ChannelStatus, ContentDeal, ContentId, DealRequest,
    MinerAddress, TransferEvent,
};
use delta_engine::{Engine, EngineBuilder, HostResources, SchedulerConfig, Upload};
use delta_executor::{DeadLetterQueue, ExecutorConfig, RetryPolicy, RetryStrategy};
use delta_provider::testing::{
    FlakyDeriver, MemoryContentStore, MockTransferClient, RecordingProposer,
};
use delta_state_memory::MemoryDealStore;

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryDealStore>,
    pub content: Arc<MemoryContentStore>,
    pub deriver: Arc<FlakyDeriver>,
    pub proposer: Arc<RecordingProposer>,
    pub transfers: Arc<MockTransferClient>,
    pub dlq: Arc<DeadLetterQueue>,
}

pub struct HarnessOptions {
    pub deriver_failures: u32,
    pub max_attempts: Option<u32>,
    pub bytes_per_cpu: u64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            deriver_failures: 0,
            max_attempts: Some(5),
            bytes_per_cpu: u64::MAX,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with(options: HarnessOptions) -> Self {
        let store = Arc::new(MemoryDealStore::new());
        let content = Arc::new(MemoryContentStore::new());
        let deriver = Arc::new(FlakyDeriver::new(options.deriver_failures));
        let proposer = Arc::new(RecordingProposer::new());
        let transfers = Arc::new(MockTransferClient::new());
        let dlq = Arc::new(DeadLetterQueue::new());

        let engine = EngineBuilder::new()
            .store(store.clone())
            .content_store(content.clone())
            .deriver(deriver.clone())
            .proposer(proposer.clone())
            .transfer_client(transfers.clone())
            .dead_letters(dlq.clone())
            .host_resources(HostResources {
                cpus: 1,
                bytes_per_cpu: options.bytes_per_cpu,
            })
            .executor_config(ExecutorConfig {
                workers: 4,
                cleanup_workers: 4,
                retry: RetryPolicy {
                    strategy: RetryStrategy::Constant {
                        delay: Duration::from_millis(10),
                    },
                    max_attempts: options.max_attempts,
                },
            })
            .build()
            .expect("engine should build");

        Self {
            engine,
            store,
            content,
            deriver,
            proposer,
            transfers,
            dlq,
        }
    }

    /// Place `data` in the content store and describe it as an upload.
    pub fn upload(&self, name: &str, data: &[u8]) -> Upload {
        let address = self.content.insert(data.to_vec());
        Upload {
            name: name.to_owned(),
            address,
            size: data.len() as u64,
        }
    }

    pub fn e2e(&self, name: &str, data: &[u8]) -> delta_engine::DealSubmission {
        delta_engine::DealSubmission {
            request: deal_request(),
            api_key: ApiKey::new("test-key"),
            upload: Some(self.upload(name, data)),
        }
    }

    /// Submit `data` end-to-end and drain the dispatcher.
    pub async fn propose(&self, data: &[u8]) -> (ContentId, ContentDeal) {
        let submitted = self
            .engine
            .submit(self.e2e("file.bin", data))
            .await
            .expect("submission should be accepted");
        self.engine.run_pending().await;
        let report = self
            .engine
            .content_status(submitted.content.id)
            .await
            .unwrap();
        let deal = report.deals.last().cloned().expect("a deal was proposed");
        (submitted.content.id, deal)
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> delta_engine::RetryScheduler {
        self.engine
            .scheduler(config)
            .build()
            .expect("scheduler should build")
            .0
    }
}

pub fn deal_request() -> DealRequest {
    DealRequest {
        miner: Some(MinerAddress::new("f01234")),
        ..DealRequest::default()
    }
}

pub fn channel(deal: &ContentDeal, status: ChannelStatus) -> TransferEvent {
    channel_with_message(deal, status, "")
}

pub fn channel_with_message(
    deal: &ContentDeal,
    status: ChannelStatus,
    message: &str,
) -> TransferEvent {
    ChannelStateUpdate {
        deal_id: deal.id,
        status,
        transfer_id: deal.transfer_id.clone().expect("deal has a transfer id"),
        message: message.to_owned(),
    }
    .into()
}
