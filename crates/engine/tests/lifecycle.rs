//! End-to-end deal lifecycle tests against in-memory collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use delta_core::{
    ApiKey, ChannelStateUpdate, ChannelStatus, CommitmentStatus, ContentAddress, ContentId,
    ContentStatus, DataTransferEvent, DataTransferEventCode, DealRequest, DealStatus,
    NewContentDeal, PieceCid, PieceCommitmentRequest, TransferEvent, TransferId, ValidationError,
};
use delta_engine::{DealSubmission, EngineError, ReconcileOutcome};
use delta_state::DealStore;
use tokio::sync::mpsc;

use common::{Harness, HarnessOptions, channel, channel_with_message, deal_request};

#[tokio::test]
async fn end_to_end_success_flow() {
    let h = Harness::new();
    let upload = h.e2e("hello.txt", b"hello delta");
    let address = upload.upload.clone().unwrap().address;

    let submitted = h.engine.submit(upload).await.unwrap();
    assert_eq!(submitted.content.status, ContentStatus::Pinned);
    assert!(submitted.piece_commitment.is_none());

    let summary = h.engine.run_pending().await;
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 0);

    let report = h.engine.content_status(submitted.content.id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::DealProposalSent);
    let commitment = report.piece_commitment.unwrap();
    assert_eq!(commitment.status, CommitmentStatus::Open);
    assert_eq!(commitment.size, 11);
    assert_eq!(report.deals.len(), 1);

    let deal = report.deals[0].clone();
    assert_eq!(deal.status(), DealStatus::Proposed);
    assert_eq!(deal.transfer_id, Some(TransferId::new(deal.id.to_string())));
    assert_eq!(
        h.engine.context().registry().lookup(deal.transfer_id.as_ref().unwrap()),
        Some(deal.id)
    );

    let outcome = h
        .engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Requested))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Started);
    let started = h.store.get_deal(deal.id).await.unwrap().unwrap();
    assert!(started.transfer_started_at.is_some());
    assert_eq!(started.last_message.as_deref(), Some("transfer-started"));
    assert_eq!(h.store.bytes_in_transfer().await.unwrap(), 11);

    let outcome = h
        .engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Completed))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Finished);

    let report = h.engine.content_status(submitted.content.id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::TransferFinished);
    let finished = &report.deals[0];
    assert_eq!(finished.status(), DealStatus::TransferFinished);
    assert_eq!(finished.on_chain_deal_id, Some(deal.id.get()));
    assert!(finished.sealed_at.is_some());
    assert!(finished.on_chain_at.is_some());
    assert_eq!(h.store.bytes_in_transfer().await.unwrap(), 0);

    // The local copy is removed by a queued job.
    assert_eq!(h.store.list_pending_removals().await.unwrap().len(), 1);
    let summary = h.engine.run_pending().await;
    assert_eq!(summary.executed, 1);
    assert!(!h.content.contains(&address));
    assert!(h.store.list_pending_removals().await.unwrap().is_empty());
}

#[tokio::test]
async fn end_to_end_failure_flow() {
    let h = Harness::new();
    let (content_id, deal) = h.propose(b"doomed bytes").await;

    h.engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Requested))
        .await
        .unwrap();
    let outcome = h
        .engine
        .reconciler()
        .handle(channel_with_message(
            &deal,
            ChannelStatus::Failed,
            "rejected by provider",
        ))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Failed);

    let report = h.engine.content_status(content_id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::TransferFailed);
    assert_eq!(
        report.content.last_message.as_deref(),
        Some("rejected by provider")
    );
    let failed = &report.deals[0];
    assert_eq!(failed.status(), DealStatus::Failed);
    assert!(failed.failed_at.is_some());
    assert!(failed.transfer_finished_at.is_none());

    h.engine.run_pending().await;
    assert_eq!(h.content.removed().len(), 1);
    assert!(h.store.list_pending_removals().await.unwrap().is_empty());
}

#[tokio::test]
async fn only_protocol_failures_fail_a_deal() {
    let h = Harness::new();
    let (_, deal) = h.propose(b"noisy").await;
    let transfer_id = deal.transfer_id.clone().unwrap();

    for code in [
        DataTransferEventCode::Error,
        DataTransferEventCode::Disconnected,
        DataTransferEventCode::ReceiveDataError,
        DataTransferEventCode::SendDataError,
        DataTransferEventCode::Cancel,
        DataTransferEventCode::RequestTimedOut,
    ] {
        let event = TransferEvent::from(DataTransferEvent {
            code,
            transfer_id: transfer_id.clone(),
            message: "connection reset".into(),
        });
        let outcome = h.engine.reconciler().handle(event).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Logged, "{code:?}");
    }

    let progress = h
        .engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Ongoing))
        .await
        .unwrap();
    assert_eq!(progress, ReconcileOutcome::Ignored);

    let unchanged = h.store.get_deal(deal.id).await.unwrap().unwrap();
    assert!(unchanged.failed_at.is_none());
    assert!(!unchanged.is_terminal());
}

#[tokio::test]
async fn terminal_deals_ignore_further_events() {
    let h = Harness::new();
    let (content_id, deal) = h.propose(b"done").await;

    h.engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Completed))
        .await
        .unwrap();
    let outcome = h
        .engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Failed))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Ignored);

    let deal = h.store.get_deal(deal.id).await.unwrap().unwrap();
    assert_eq!(deal.status(), DealStatus::TransferFinished);
    let content = h.store.get_content(content_id).await.unwrap().unwrap();
    assert_eq!(content.status, ContentStatus::TransferFinished);
}

#[tokio::test]
async fn finished_transfer_without_numeric_id_keeps_no_chain_id() {
    let h = Harness::new();
    let (_, deal) = h.propose(b"opaque").await;

    let mut opaque = deal.clone();
    opaque.transfer_id = Some(TransferId::new("channel-abc"));
    h.engine
        .reconciler()
        .handle(channel(&opaque, ChannelStatus::TransferFinished))
        .await
        .unwrap();

    let deal = h.store.get_deal(deal.id).await.unwrap().unwrap();
    assert_eq!(deal.status(), DealStatus::TransferFinished);
    assert_eq!(deal.on_chain_deal_id, None);
}

#[tokio::test]
async fn rejected_proposal_fails_the_deal() {
    let h = Harness::new();
    h.proposer.set_failure(Some("ask price too low".into()));

    let submitted = h.engine.submit(h.e2e("a.bin", b"abc")).await.unwrap();
    let summary = h.engine.run_pending().await;
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 1);

    let report = h.engine.content_status(submitted.content.id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::DealProposalFailed);
    assert_eq!(
        report.content.last_message.as_deref(),
        Some("proposal rejected: ask price too low")
    );
    assert_eq!(report.deals.len(), 1);
    assert_eq!(report.deals[0].status(), DealStatus::Failed);
    assert!(report.deals[0].transfer_id.is_none());

    let dead = h.dlq.drain();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job, "deal-maker");
}

#[tokio::test(start_paused = true)]
async fn piece_commitment_requeues_until_success() {
    let h = Harness::with(HarnessOptions {
        deriver_failures: 2,
        ..HarnessOptions::default()
    });

    let submitted = h.engine.submit(h.e2e("f", b"flaky")).await.unwrap();
    let summary = h.engine.run_pending().await;
    // Three derivation attempts, then the deal maker.
    assert_eq!(summary.executed, 4);
    assert_eq!(summary.failed, 2);
    assert_eq!(h.deriver.calls(), 3);

    let content = h
        .store
        .get_content(submitted.content.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.status, ContentStatus::DealProposalSent);
}

#[tokio::test(start_paused = true)]
async fn piece_commitment_stops_at_attempt_cap() {
    let h = Harness::with(HarnessOptions {
        deriver_failures: u32::MAX,
        max_attempts: Some(3),
        ..HarnessOptions::default()
    });

    let submitted = h.engine.submit(h.e2e("f", b"broken")).await.unwrap();
    let summary = h.engine.run_pending().await;
    assert_eq!(summary.executed, 3);
    assert_eq!(summary.failed, 3);
    assert_eq!(h.deriver.calls(), 3);

    let content = h
        .store
        .get_content(submitted.content.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.status, ContentStatus::PieceComputingFailed);
    assert_eq!(
        content.last_message.as_deref(),
        Some("execution failed: derivation failed")
    );
    assert!(content.piece_commitment_id.is_none());

    let dead = h.dlq.drain();
    assert_eq!(dead.len(), 3);
    assert!(dead.iter().all(|entry| entry.job == "piece-commitment"));
}

#[tokio::test]
async fn import_flow_skips_piece_computation() {
    let h = Harness::new();
    let request = DealRequest {
        cid: Some(ContentAddress::new("bafy-imported")),
        connection_mode: Some("import".into()),
        size: Some(1000),
        piece_commitment: Some(PieceCommitmentRequest {
            piece: Some(PieceCid::new("baga-imported")),
            padded_piece_size: Some(2048),
            unpadded_piece_size: None,
        }),
        ..deal_request()
    };

    let submitted = h
        .engine
        .submit(DealSubmission {
            request,
            api_key: ApiKey::new("test-key"),
            upload: None,
        })
        .await
        .unwrap();
    assert_eq!(submitted.content.status, ContentStatus::MakingDealProposal);
    let commitment = submitted.piece_commitment.clone().unwrap();
    assert_eq!(commitment.status, CommitmentStatus::Committed);
    assert_eq!(commitment.padded_piece_size, 2048);
    assert_eq!(commitment.unpadded_piece_size, 2032);

    let summary = h.engine.run_pending().await;
    assert_eq!(summary.executed, 1);
    assert_eq!(h.deriver.calls(), 0);

    let report = h.engine.content_status(submitted.content.id).await.unwrap();
    assert_eq!(report.content.status, ContentStatus::DealProposalSent);
    let proposals = h.proposer.proposals();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].piece, PieceCid::new("baga-imported"));

    let fetched = h.engine.piece_commitment(commitment.id).await.unwrap();
    assert_eq!(fetched, commitment);
}

#[tokio::test]
async fn end_to_end_with_declared_commitment_goes_straight_to_deal_maker() {
    let h = Harness::new();
    let mut submission = h.e2e("declared.car", b"declared bytes");
    submission.request.piece_commitment = Some(PieceCommitmentRequest {
        piece: Some(PieceCid::new("baga-declared")),
        padded_piece_size: None,
        unpadded_piece_size: Some(127),
    });

    let submitted = h.engine.submit(submission).await.unwrap();
    assert_eq!(submitted.content.status, ContentStatus::Pinned);
    assert!(submitted.content.piece_commitment_id.is_some());

    h.engine.run_pending().await;
    assert_eq!(h.deriver.calls(), 0);
    let content = h
        .store
        .get_content(submitted.content.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.status, ContentStatus::DealProposalSent);
}

#[tokio::test]
async fn validation_failure_writes_nothing() {
    let h = Harness::new();
    let mut submission = h.e2e("x", b"x");
    submission.request.miner = None;

    let err = h.engine.submit(submission).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::MissingMiner)
    ));
    assert!(h.store.get_content(ContentId::new(1)).await.unwrap().is_none());
    assert_eq!(h.engine.dispatcher().pending(), 0);
}

#[tokio::test]
async fn validation_examples() {
    let h = Harness::new();

    let mut submission = h.e2e("x", b"x");
    submission.request.start_epoch_in_days = Some(15);
    submission.request.duration_in_days = Some(30);
    let err = h.engine.submit(submission).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "start_epoch_in_days can only be 14 days or less"
    );

    let mut submission = h.e2e("x", b"x");
    submission.request.replication = Some(7);
    let err = h.engine.submit(submission).await.unwrap_err();
    assert_eq!(err.to_string(), "replication count is more than allowed (6)");
}

#[tokio::test]
async fn import_without_commitment_is_rejected() {
    let h = Harness::new();
    let request = DealRequest {
        cid: Some(ContentAddress::new("bafy-imported")),
        connection_mode: Some("import".into()),
        ..deal_request()
    };
    let err = h
        .engine
        .submit(DealSubmission {
            request,
            api_key: ApiKey::new("k"),
            upload: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::MissingPieceCommitment)
    ));
}

#[tokio::test]
async fn end_to_end_without_bytes_is_rejected() {
    let h = Harness::new();
    let err = h
        .engine
        .submit(DealSubmission {
            request: deal_request(),
            api_key: ApiKey::new("k"),
            upload: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingContent));
}

#[tokio::test]
async fn admission_rejects_when_too_much_is_in_flight() {
    let h = Harness::with(HarnessOptions {
        bytes_per_cpu: 4,
        ..HarnessOptions::default()
    });
    let (_, deal) = h.propose(b"hello").await;
    h.engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Requested))
        .await
        .unwrap();

    let err = h.engine.submit(h.e2e("next", b"next")).await.unwrap_err();
    match err {
        EngineError::AdmissionRejected { in_flight, budget } => {
            assert_eq!(in_flight, 5);
            assert_eq!(budget, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn restart_without_transfer_state_fails() {
    let h = Harness::new();
    let (_, deal) = h.propose(b"stalled").await;
    h.dlq.drain();

    h.engine.restart_transfer(deal.id);
    let summary = h.engine.run_pending().await;
    assert_eq!(summary.failed, 1);
    let dead = h.dlq.drain();
    assert!(dead[0].error.contains("no transfer state"));
    assert!(h.transfers.restarts().is_empty());
}

#[tokio::test]
async fn restart_reregisters_the_transfer() {
    let h = Harness::new();
    let (_, deal) = h.propose(b"stalled").await;
    let transfer_id = deal.transfer_id.clone().unwrap();
    h.engine.context().registry().forget(&transfer_id);
    h.transfers.set_state(transfer_id.clone(), ChannelStatus::Ongoing);

    h.engine.restart_transfer(deal.id);
    let summary = h.engine.run_pending().await;
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.transfers.restarts(), vec![transfer_id.clone()]);
    assert_eq!(
        h.engine.context().registry().lookup(&transfer_id),
        Some(deal.id)
    );
}

#[tokio::test]
async fn failed_removal_stays_pending() {
    let h = Harness::new();
    let (_, deal) = h.propose(b"sticky").await;
    h.content.set_fail_removals(true);

    h.engine
        .reconciler()
        .handle(channel(&deal, ChannelStatus::Completed))
        .await
        .unwrap();
    let summary = h.engine.run_pending().await;
    assert_eq!(summary.failed, 1);

    let pending = h.store.list_pending_removals().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[0].last_error.as_deref(), Some("i/o error: removal disabled"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_for_one_deal_are_serialised() {
    let h = Arc::new(Harness::new());
    let (content_id, deal) = h.propose(b"racy").await;

    let mut handles = Vec::new();
    for status in [
        ChannelStatus::Requested,
        ChannelStatus::Completed,
        ChannelStatus::Failed,
        ChannelStatus::Requested,
        ChannelStatus::Cancelled,
    ] {
        let h = Arc::clone(&h);
        let event = channel(&deal, status);
        handles.push(tokio::spawn(async move {
            h.engine.reconciler().handle(event).await.unwrap()
        }));
    }

    let mut terminal = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        if matches!(outcome, ReconcileOutcome::Finished | ReconcileOutcome::Failed) {
            terminal += 1;
        }
    }
    assert_eq!(terminal, 1);

    let deal = h.store.get_deal(deal.id).await.unwrap().unwrap();
    let content = h.store.get_content(content_id).await.unwrap().unwrap();
    match deal.status() {
        DealStatus::TransferFinished => {
            assert_eq!(content.status, ContentStatus::TransferFinished);
        }
        DealStatus::Failed => assert_eq!(content.status, ContentStatus::TransferFailed),
        other => panic!("deal left non-terminal: {other:?}"),
    }
}

#[tokio::test]
async fn reconciler_loop_drains_the_event_channel() {
    let h = Harness::new();
    let (_, deal) = h.propose(b"looped").await;

    let (events_tx, events_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let reconciler = Arc::clone(h.engine.reconciler());
    let task = tokio::spawn(reconciler.run(events_rx, shutdown_rx));

    events_tx
        .send(channel(&deal, ChannelStatus::Requested))
        .await
        .unwrap();
    drop(events_tx);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop should stop when the channel closes")
        .unwrap();

    let deal = h.store.get_deal(deal.id).await.unwrap().unwrap();
    assert_eq!(deal.status(), DealStatus::TransferStarted);
}

#[tokio::test]
async fn reconciler_loop_stops_on_shutdown() {
    let h = Harness::new();
    let (_events_tx, events_rx) = mpsc::channel::<TransferEvent>(16);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let task = tokio::spawn(Arc::clone(h.engine.reconciler()).run(events_rx, shutdown_rx));

    shutdown_tx.send(()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop should stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn late_deal_failure_still_removes_the_local_copy() {
    let h = Harness::new();
    let (content_id, first) = h.propose(b"twice").await;
    let params = h
        .store
        .get_proposal_parameters(content_id)
        .await
        .unwrap()
        .unwrap();
    let second = h
        .store
        .create_deal(NewContentDeal {
            content_id,
            miner: params.miner.clone(),
            proposal: params,
        })
        .await
        .unwrap();

    h.engine
        .reconciler()
        .handle(channel(&first, ChannelStatus::Completed))
        .await
        .unwrap();
    h.engine.run_pending().await;
    assert!(h.store.list_pending_removals().await.unwrap().is_empty());

    // The content is already transfer-finished, so the failure cannot move it.
    let outcome = h
        .engine
        .reconciler()
        .handle(
            ChannelStateUpdate {
                deal_id: second.id,
                status: ChannelStatus::Failed,
                transfer_id: TransferId::new("second"),
                message: "late failure".into(),
            }
            .into(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Failed);

    let second = h.store.get_deal(second.id).await.unwrap().unwrap();
    assert_eq!(second.status(), DealStatus::Failed);
    let content = h.store.get_content(content_id).await.unwrap().unwrap();
    assert_eq!(content.status, ContentStatus::TransferFinished);
    assert_eq!(h.store.list_pending_removals().await.unwrap().len(), 1);
}
