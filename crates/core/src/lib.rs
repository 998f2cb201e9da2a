pub mod deal_request;
pub mod epoch;
pub mod event;
pub mod model;
pub mod state_machine;
pub mod status;
pub mod types;

pub use deal_request::{DealRequest, PieceCommitmentRequest, ValidationError, WalletRequest};
pub use event::{
    ChannelStateUpdate, ChannelStatus, ChannelTransition, DataTransferEvent,
    DataTransferEventCode, TransferEvent,
};
pub use model::{
    Content, ContentDeal, DealProposalParameters, LocalCopyRemoval, NewContent, NewContentDeal,
    NewPieceCommitment, PieceCommitment,
};
pub use state_machine::TransitionError;
pub use status::{CommitmentStatus, ConnectionMode, ContentStatus, DealStatus, UnknownStatus};
pub use types::{
    ApiKey, ContentAddress, ContentDealId, ContentId, MinerAddress, PieceCid, PieceCommitmentId,
    RemovalId, TransferId, WalletAddress,
};

/// Last message recorded on a deal whose transfer was accepted.
pub const MESSAGE_TRANSFER_STARTED: &str = "transfer-started";

/// Last message recorded on a deal whose transfer completed.
pub const MESSAGE_TRANSFER_FINISHED: &str = "transfer-finished";
