use std::sync::Arc;

use dashmap::DashMap;
use delta_core::{ContentDealId, TransferId};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Maps transfer ids to the deals that started them.
///
/// Lets data-transfer events, which only carry the transfer id, be
/// attributed to a deal without a store lookup.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    entries: DashMap<TransferId, ContentDealId>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `transfer` as belonging to `deal`. Re-registering replaces the
    /// previous owner.
    pub fn register(&self, transfer: TransferId, deal: ContentDealId) {
        self.entries.insert(transfer, deal);
    }

    pub fn lookup(&self, transfer: &TransferId) -> Option<ContentDealId> {
        self.entries.get(transfer).map(|entry| *entry)
    }

    pub fn forget(&self, transfer: &TransferId) {
        self.entries.remove(transfer);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-deal locks held across a read-modify-write of one deal.
///
/// The reconciler and the deal maker both write deal rows; holding the
/// deal's lock while re-reading and writing keeps one from overwriting the
/// other.
#[derive(Debug, Default)]
pub struct DealLocks {
    locks: DashMap<ContentDealId, Arc<Mutex<()>>>,
}

impl DealLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `deal`.
    pub async fn lock(&self, deal: ContentDealId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&*self.locks.entry(deal).or_default());
        lock.lock_owned().await
    }

    /// Drop the lock of a deal that no longer changes.
    pub fn forget(&self, deal: ContentDealId) {
        self.locks.remove(&deal);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
