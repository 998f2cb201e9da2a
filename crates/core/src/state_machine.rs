//! The content lifecycle state machine.
//!
//! Content moves forward through commitment computation, proposal and
//! transfer. Backward moves are limited to the explicit retry edges listed
//! in [`ContentStatus::successors`]. Statuses from `piece-assigned` onwards
//! require an attached piece commitment.

use thiserror::Error;

use crate::status::ContentStatus;

/// A rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("transition from {from} to {to} is not allowed")]
    NotAllowed {
        from: ContentStatus,
        to: ContentStatus,
    },

    #[error("content cannot enter {to} without a piece commitment")]
    MissingCommitment { to: ContentStatus },
}

impl ContentStatus {
    /// Statuses reachable from `self` in one step.
    pub const fn successors(self) -> &'static [ContentStatus] {
        use ContentStatus::{
            DealProposalFailed, DealProposalSent, MakingDealProposal, PieceAssigned,
            PieceComputing, PieceComputingFailed, Pinned, TransferFailed, TransferFinished,
        };
        match self {
            Pinned => &[PieceComputing, MakingDealProposal],
            PieceComputing => &[PieceAssigned, PieceComputingFailed, PieceComputing],
            PieceComputingFailed => &[PieceComputing],
            PieceAssigned => &[MakingDealProposal, PieceComputing],
            MakingDealProposal => &[
                DealProposalSent,
                DealProposalFailed,
                MakingDealProposal,
                TransferFinished,
                TransferFailed,
            ],
            DealProposalFailed => &[MakingDealProposal],
            DealProposalSent => &[TransferFinished, TransferFailed, MakingDealProposal],
            TransferFailed => &[MakingDealProposal],
            TransferFinished => &[],
        }
    }

    /// Whether moving from `self` to `next` follows a documented edge.
    pub fn can_transition_to(self, next: ContentStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Whether content in this status needs a piece commitment reference.
    pub const fn requires_commitment(self) -> bool {
        !matches!(
            self,
            Self::Pinned | Self::PieceComputing | Self::PieceComputingFailed
        )
    }

    /// Whether no automatic transition leaves this status.
    ///
    /// `transfer-failed` counts as terminal even though an operator-driven
    /// retry may re-enter the proposal stage.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TransferFinished | Self::TransferFailed)
    }

    /// Validate a move to `next` for content that does or does not carry a
    /// piece commitment.
    pub fn check_transition(
        self,
        next: ContentStatus,
        has_commitment: bool,
    ) -> Result<(), TransitionError> {
        if !self.can_transition_to(next) {
            return Err(TransitionError::NotAllowed {
                from: self,
                to: next,
            });
        }
        if next.requires_commitment() && !has_commitment {
            return Err(TransitionError::MissingCommitment { to: next });
        }
        Ok(())
    }
}
