use chrono::{Duration, Utc};

use delta_core::{
    ApiKey, CommitmentStatus, ConnectionMode, ContentAddress, ContentId, ContentStatus,
    DealProposalParameters, MinerAddress, NewContent, NewContentDeal, NewPieceCommitment,
    PieceCid, TransferId, TransitionError,
};

use crate::error::StateError;
use crate::store::DealStore;

fn new_content(address: &str, status: ContentStatus) -> NewContent {
    NewContent {
        address: ContentAddress::new(address),
        name: format!("{address}.bin"),
        size: 1024,
        requesting_api_key: ApiKey::new("conformance-key"),
        connection_mode: ConnectionMode::EndToEnd,
        status,
    }
}

fn new_commitment(address: &str, status: CommitmentStatus) -> NewPieceCommitment {
    NewPieceCommitment {
        address: ContentAddress::new(address),
        piece: PieceCid::new(format!("baga-{address}")),
        size: 1024,
        padded_piece_size: 2048,
        unpadded_piece_size: 2032,
        status,
    }
}

fn proposal(content_id: ContentId) -> DealProposalParameters {
    DealProposalParameters {
        content_id,
        miner: MinerAddress::new("f01000"),
        wallet: None,
        label: "conformance".into(),
        duration: 1_555_200,
        start_epoch: None,
        verified_deal: true,
        remove_unsealed_copy: false,
        skip_ipni_announce: false,
        replication: 0,
    }
}

/// Run the full deal store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_store_conformance_tests(store: &dyn DealStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_create_and_get_content(store).await?;
    test_transition_follows_state_machine(store).await?;
    test_transition_requires_commitment(store).await?;
    test_attach_piece_commitment(store).await?;
    test_create_with_commitment(store).await?;
    test_proposal_parameters(store).await?;
    test_deal_lifecycle(store).await?;
    test_stalled_deals(store).await?;
    test_bytes_in_transfer(store).await?;
    test_stale_contents(store).await?;
    test_removals(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn DealStore) -> Result<(), StateError> {
    assert!(store.get_content(ContentId::new(i64::MAX)).await?.is_none());
    assert!(
        store
            .find_deal_by_transfer_id(&TransferId::new("missing-transfer"))
            .await?
            .is_none()
    );
    let err = store
        .transition_content(ContentId::new(i64::MAX), ContentStatus::PieceComputing, None)
        .await;
    assert!(
        matches!(err, Err(StateError::NotFound(_))),
        "transition of missing content should be NotFound"
    );
    Ok(())
}

async fn test_create_and_get_content(store: &dyn DealStore) -> Result<(), StateError> {
    let a = store
        .create_content(new_content("create-a", ContentStatus::Pinned))
        .await?;
    let b = store
        .create_content(new_content("create-b", ContentStatus::Pinned))
        .await?;
    assert_ne!(a.id, b.id, "content ids must be unique");

    let loaded = store.get_content(a.id).await?.expect("content should exist");
    assert_eq!(loaded.address, ContentAddress::new("create-a"));
    assert_eq!(loaded.status, ContentStatus::Pinned);
    assert_eq!(loaded.size, 1024);
    assert!(loaded.piece_commitment_id.is_none());
    Ok(())
}

async fn test_transition_follows_state_machine(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("transition", ContentStatus::Pinned))
        .await?;

    let moved = store
        .transition_content(content.id, ContentStatus::PieceComputing, None)
        .await?;
    assert_eq!(moved.status, ContentStatus::PieceComputing);
    assert_eq!(moved.last_message.as_deref(), Some("piece-computing"));

    let failed = store
        .transition_content(
            content.id,
            ContentStatus::PieceComputingFailed,
            Some("resolver unavailable"),
        )
        .await?;
    assert_eq!(failed.last_message.as_deref(), Some("resolver unavailable"));

    let err = store
        .transition_content(content.id, ContentStatus::TransferFinished, None)
        .await;
    assert!(
        matches!(
            err,
            Err(StateError::Transition(TransitionError::NotAllowed { .. }))
        ),
        "undocumented edge must be rejected"
    );
    let unchanged = store.get_content(content.id).await?.expect("exists");
    assert_eq!(unchanged.status, ContentStatus::PieceComputingFailed);
    Ok(())
}

async fn test_transition_requires_commitment(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("needs-commitment", ContentStatus::Pinned))
        .await?;
    let err = store
        .transition_content(content.id, ContentStatus::MakingDealProposal, None)
        .await;
    assert!(
        matches!(
            err,
            Err(StateError::Transition(
                TransitionError::MissingCommitment { .. }
            ))
        ),
        "proposal stage requires a commitment"
    );
    Ok(())
}

async fn test_attach_piece_commitment(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("attach", ContentStatus::Pinned))
        .await?;
    store
        .transition_content(content.id, ContentStatus::PieceComputing, None)
        .await?;

    let (updated, commitment) = store
        .attach_piece_commitment(content.id, new_commitment("attach", CommitmentStatus::Open))
        .await?;
    assert_eq!(updated.status, ContentStatus::PieceAssigned);
    assert_eq!(updated.piece_commitment_id, Some(commitment.id));
    assert_eq!(commitment.status, CommitmentStatus::Open);

    let loaded = store
        .get_piece_commitment(commitment.id)
        .await?
        .expect("commitment should exist");
    assert_eq!(loaded.piece, PieceCid::new("baga-attach"));
    assert_eq!(loaded.padded_piece_size, 2048);

    // Recomputing supersedes the reference.
    store
        .transition_content(content.id, ContentStatus::PieceComputing, None)
        .await?;
    let (again, second) = store
        .attach_piece_commitment(content.id, new_commitment("attach", CommitmentStatus::Open))
        .await?;
    assert_ne!(second.id, commitment.id);
    assert_eq!(again.piece_commitment_id, Some(second.id));

    // Attaching from a status that cannot reach piece-assigned fails and
    // leaves no dangling reference change.
    let pinned = store
        .create_content(new_content("attach-pinned", ContentStatus::Pinned))
        .await?;
    let err = store
        .attach_piece_commitment(pinned.id, new_commitment("attach-pinned", CommitmentStatus::Open))
        .await;
    assert!(matches!(err, Err(StateError::Transition(_))));
    let still = store.get_content(pinned.id).await?.expect("exists");
    assert!(still.piece_commitment_id.is_none());
    Ok(())
}

async fn test_create_with_commitment(store: &dyn DealStore) -> Result<(), StateError> {
    let (content, commitment) = store
        .create_content_with_commitment(
            new_content("import", ContentStatus::MakingDealProposal),
            new_commitment("import", CommitmentStatus::Committed),
        )
        .await?;
    assert_eq!(content.piece_commitment_id, Some(commitment.id));
    assert_eq!(content.status, ContentStatus::MakingDealProposal);
    assert_eq!(commitment.status, CommitmentStatus::Committed);
    Ok(())
}

async fn test_proposal_parameters(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("params", ContentStatus::Pinned))
        .await?;
    assert!(store.get_proposal_parameters(content.id).await?.is_none());

    let mut params = proposal(content.id);
    store.save_proposal_parameters(&params).await?;
    params.label = "relabelled".into();
    params.start_epoch = Some(4_000_000);
    store.save_proposal_parameters(&params).await?;

    let loaded = store
        .get_proposal_parameters(content.id)
        .await?
        .expect("params should exist");
    assert_eq!(loaded, params);
    Ok(())
}

async fn test_deal_lifecycle(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("deal", ContentStatus::Pinned))
        .await?;
    let mut deal = store
        .create_deal(NewContentDeal {
            content_id: content.id,
            miner: MinerAddress::new("f01000"),
            proposal: proposal(content.id),
        })
        .await?;
    assert!(deal.transfer_id.is_none());
    assert!(!deal.is_terminal());

    deal.transfer_id = Some(TransferId::new("conformance-transfer"));
    deal.mark_transfer_started(Utc::now(), "transfer-started");
    store.update_deal(&deal).await?;

    let found = store
        .find_deal_by_transfer_id(&TransferId::new("conformance-transfer"))
        .await?
        .expect("deal should be found by transfer id");
    assert_eq!(found.id, deal.id);
    assert!(found.transfer_started_at.is_some());
    assert_eq!(found.last_message.as_deref(), Some("transfer-started"));

    deal.mark_transfer_finished(Utc::now(), Some(42), "transfer-finished");
    store.update_deal(&deal).await?;
    let finished = store.get_deal(deal.id).await?.expect("exists");
    assert_eq!(finished.on_chain_deal_id, Some(42));
    assert!(finished.is_terminal());

    let second = store
        .create_deal(NewContentDeal {
            content_id: content.id,
            miner: MinerAddress::new("f02000"),
            proposal: proposal(content.id),
        })
        .await?;
    let deals = store.list_deals_for_content(content.id).await?;
    let ids: Vec<_> = deals.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![deal.id, second.id]);
    Ok(())
}

async fn test_stalled_deals(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("stalled", ContentStatus::Pinned))
        .await?;
    let mut stalled = store
        .create_deal(NewContentDeal {
            content_id: content.id,
            miner: MinerAddress::new("f01000"),
            proposal: proposal(content.id),
        })
        .await?;
    stalled.transfer_id = Some(TransferId::new("stalled-transfer"));
    store.update_deal(&stalled).await?;

    let mut started = store
        .create_deal(NewContentDeal {
            content_id: content.id,
            miner: MinerAddress::new("f01000"),
            proposal: proposal(content.id),
        })
        .await?;
    started.transfer_id = Some(TransferId::new("started-transfer"));
    started.mark_transfer_started(Utc::now(), "transfer-started");
    store.update_deal(&started).await?;

    let future = Utc::now() + Duration::hours(1);
    let candidates = store.list_stalled_deals(future).await?;
    assert!(candidates.iter().any(|d| d.id == stalled.id));
    assert!(!candidates.iter().any(|d| d.id == started.id));

    let past = Utc::now() - Duration::hours(1);
    let none = store.list_stalled_deals(past).await?;
    assert!(!none.iter().any(|d| d.id == stalled.id));
    Ok(())
}

async fn test_bytes_in_transfer(store: &dyn DealStore) -> Result<(), StateError> {
    let before = store.bytes_in_transfer().await?;
    let content = store
        .create_content(new_content("in-flight", ContentStatus::Pinned))
        .await?;
    let mut deal = store
        .create_deal(NewContentDeal {
            content_id: content.id,
            miner: MinerAddress::new("f01000"),
            proposal: proposal(content.id),
        })
        .await?;
    deal.mark_transfer_started(Utc::now(), "transfer-started");
    store.update_deal(&deal).await?;
    assert_eq!(store.bytes_in_transfer().await?, before + 1024);

    deal.mark_failed(Utc::now(), "failed");
    store.update_deal(&deal).await?;
    assert_eq!(store.bytes_in_transfer().await?, before);
    Ok(())
}

async fn test_stale_contents(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("stale", ContentStatus::Pinned))
        .await?;
    store
        .transition_content(content.id, ContentStatus::PieceComputing, None)
        .await?;

    let future = Utc::now() + Duration::hours(1);
    let stale = store
        .list_contents_in_status(&[ContentStatus::PieceComputing], future)
        .await?;
    assert!(stale.iter().any(|c| c.id == content.id));

    let other = store
        .list_contents_in_status(&[ContentStatus::DealProposalFailed], future)
        .await?;
    assert!(!other.iter().any(|c| c.id == content.id));

    let past = Utc::now() - Duration::hours(1);
    let fresh = store
        .list_contents_in_status(&[ContentStatus::PieceComputing], past)
        .await?;
    assert!(!fresh.iter().any(|c| c.id == content.id));
    Ok(())
}

async fn test_removals(store: &dyn DealStore) -> Result<(), StateError> {
    let content = store
        .create_content(new_content("removal", ContentStatus::Pinned))
        .await?;
    let address = ContentAddress::new("removal");
    let removal = store.schedule_removal(content.id, &address).await?;
    let again = store.schedule_removal(content.id, &address).await?;
    assert_eq!(removal.id, again.id, "scheduling twice keeps one record");
    assert_eq!(removal.attempts, 0);

    store.record_removal_failure(removal.id, "busy").await?;
    let pending = store.list_pending_removals().await?;
    let entry = pending
        .iter()
        .find(|r| r.id == removal.id)
        .expect("removal should stay pending");
    assert_eq!(entry.attempts, 1);
    assert_eq!(entry.last_error.as_deref(), Some("busy"));

    assert!(store.complete_removal(removal.id).await?);
    assert!(!store.complete_removal(removal.id).await?);
    let pending = store.list_pending_removals().await?;
    assert!(!pending.iter().any(|r| r.id == removal.id));
    Ok(())
}
