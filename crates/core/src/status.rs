//! Closed status enumerations for content, commitments and deals.
//!
//! Every status has a stable wire name, used both in JSON and as the value
//! persisted in the `status` columns of relational backends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a persisted or user-supplied status string does not
/// name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable wire name of this variant.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle status of a [`Content`](crate::Content) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentStatus {
    /// Content bytes are held locally; nothing has been computed yet.
    Pinned,
    /// A piece commitment is being derived.
    PieceComputing,
    /// The last derivation attempt failed.
    PieceComputingFailed,
    /// A piece commitment is attached and a proposal can be made.
    PieceAssigned,
    /// A deal proposal is being built and sent.
    MakingDealProposal,
    /// The proposal was accepted for transmission; waiting on the transfer.
    DealProposalSent,
    /// Transmitting the proposal failed.
    DealProposalFailed,
    /// Data reached the counterparty and the deal landed on chain.
    TransferFinished,
    /// The transport reported an authoritative failure.
    TransferFailed,
}

wire_enum!(ContentStatus, "content status", {
    Pinned => "pinned",
    PieceComputing => "piece-computing",
    PieceComputingFailed => "piece-computing-failed",
    PieceAssigned => "piece-assigned",
    MakingDealProposal => "making-deal-proposal",
    DealProposalSent => "deal-proposal-sent",
    DealProposalFailed => "deal-proposal-failed",
    TransferFinished => "transfer-finished",
    TransferFailed => "transfer-failed",
});

/// Status of a [`PieceCommitment`](crate::PieceCommitment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitmentStatus {
    /// Computed locally and not yet bound to a sealed deal.
    Open,
    /// Supplied by the client for an import deal.
    Committed,
}

wire_enum!(CommitmentStatus, "commitment status", {
    Open => "open",
    Committed => "committed",
});

/// How content reaches the storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Delta transfers the bytes itself.
    #[default]
    #[serde(rename = "e2e")]
    EndToEnd,
    /// The client ships the data out of band; only the proposal is sent.
    #[serde(rename = "import")]
    Import,
}

wire_enum!(ConnectionMode, "connection mode", {
    EndToEnd => "e2e",
    Import => "import",
});

/// Progress of a single [`ContentDeal`](crate::ContentDeal), derived from its
/// timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DealStatus {
    Proposed,
    TransferStarted,
    TransferFinished,
    Failed,
}

wire_enum!(DealStatus, "deal status", {
    Proposed => "proposed",
    TransferStarted => "transfer-started",
    TransferFinished => "transfer-finished",
    Failed => "failed",
});

impl DealStatus {
    /// Whether no further transport event may change the deal.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TransferFinished | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_status_wire_names_roundtrip() {
        for status in ContentStatus::ALL {
            let parsed: ContentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn content_status_set_is_closed() {
        assert_eq!(ContentStatus::ALL.len(), 9);
        let err = "sealing".parse::<ContentStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown content status: sealing");
    }

    #[test]
    fn connection_mode_wire_names() {
        assert_eq!(ConnectionMode::default(), ConnectionMode::EndToEnd);
        assert_eq!("e2e".parse::<ConnectionMode>().unwrap(), ConnectionMode::EndToEnd);
        assert_eq!(
            serde_json::to_string(&ConnectionMode::Import).unwrap(),
            "\"import\""
        );
        assert!("online".parse::<ConnectionMode>().is_err());
    }

    #[test]
    fn deal_status_terminality() {
        assert!(!DealStatus::Proposed.is_terminal());
        assert!(!DealStatus::TransferStarted.is_terminal());
        assert!(DealStatus::TransferFinished.is_terminal());
        assert!(DealStatus::Failed.is_terminal());
    }
}
