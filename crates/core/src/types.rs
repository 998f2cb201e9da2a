use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

macro_rules! newtype_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw row identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Return the raw row identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

newtype_string!(ContentAddress, "A content identifier (CID) for stored bytes.");
newtype_string!(PieceCid, "A piece commitment value computed over content.");
newtype_string!(MinerAddress, "The storage provider a deal is negotiated with.");
newtype_string!(WalletAddress, "A wallet address used to fund deals.");
newtype_string!(ApiKey, "The API credential that owns a piece of content.");
newtype_string!(
    TransferId,
    "Correlates transport events with the deal that started the transfer."
);

newtype_id!(ContentId, "Row identifier of a content record.");
newtype_id!(PieceCommitmentId, "Row identifier of a piece commitment.");
newtype_id!(ContentDealId, "Row identifier of a content deal.");
newtype_id!(RemovalId, "Row identifier of a pending local-copy removal.");

impl TransferId {
    /// Interpret the transfer identifier as a numeric on-chain deal id.
    ///
    /// Transfers that complete report the on-chain deal id through this
    /// field. Returns `None` when it is not an integer.
    pub fn as_deal_id(&self) -> Option<i64> {
        self.0.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let cid = ContentAddress::from("bafy-content");
        assert_eq!(cid.as_str(), "bafy-content");
        assert_eq!(&*cid, "bafy-content");
    }

    #[test]
    fn id_display_and_parse() {
        let id = ContentId::new(42);
        assert_eq!(id.to_string(), "42");
        let parsed: ContentId = "42".parse().unwrap();
        assert_eq!(parsed, id);
        assert!("x".parse::<ContentDealId>().is_err());
    }

    #[test]
    fn id_serializes_as_number() {
        let json = serde_json::to_string(&ContentDealId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: ContentDealId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 7);
    }

    #[test]
    fn transfer_id_as_deal_id() {
        assert_eq!(TransferId::new("1234").as_deal_id(), Some(1234));
        assert_eq!(TransferId::new("chan-1").as_deal_id(), None);
    }
}
