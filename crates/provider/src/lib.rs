pub mod commitment;
pub mod content;
pub mod error;
pub mod log;
pub mod proposer;
pub mod testing;
pub mod transfer;

pub use commitment::{DerivedCommitment, DigestPieceDeriver, PieceCommitmentDeriver};
pub use content::{ContentReader, ContentStore, FsContentStore, content_address};
pub use error::ProviderError;
pub use log::LogTransport;
pub use proposer::{DealProposer, ProposalRequest};
pub use transfer::{TransferClient, TransferState};
