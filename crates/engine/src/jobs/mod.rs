//! Jobs executed by the dispatcher.
//!
//! Each job carries the ids it works on and reloads everything else from the
//! store, so a resubmitted job always acts on current state.

mod deal_maker;
mod local_copy_removal;
mod piece_commitment;
mod register_transfer;
mod transfer_restart;

pub use deal_maker::DealMakerJob;
pub use local_copy_removal::LocalCopyRemovalJob;
pub use piece_commitment::PieceCommitmentJob;
pub use register_transfer::RegisterTransferJob;
pub use transfer_restart::TransferRestartJob;
