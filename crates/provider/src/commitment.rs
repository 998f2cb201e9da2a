use async_trait::async_trait;
use delta_core::model::{padded_size, unpadded_size};
use delta_core::{ContentAddress, PieceCid};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::content::ContentStore;
use crate::error::ProviderError;

/// Smallest piece the commitment is computed over, in padded bytes.
pub const MIN_PADDED_PIECE_SIZE: u64 = 128;

const READ_CHUNK: usize = 64 * 1024;

/// Result of a commitment derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCommitment {
    pub piece: PieceCid,
    /// Bytes read from the content.
    pub payload_size: u64,
    pub padded_piece_size: u64,
    pub unpadded_piece_size: u64,
}

/// Computes the piece commitment of stored content.
///
/// Derivation must be deterministic: the same bytes always yield the same
/// commitment.
#[async_trait]
pub trait PieceCommitmentDeriver: Send + Sync {
    async fn derive(
        &self,
        address: &ContentAddress,
        store: &dyn ContentStore,
    ) -> Result<DerivedCommitment, ProviderError>;
}

/// Padded piece size holding `payload` bytes: the next power of two of the
/// padded payload, never below [`MIN_PADDED_PIECE_SIZE`].
///
/// `None` when no 64-bit piece size can hold the payload.
pub fn piece_size_for(payload: u64) -> Option<u64> {
    padded_size(payload)?
        .max(MIN_PADDED_PIECE_SIZE)
        .checked_next_power_of_two()
}

/// Deterministic stand-in for the piece commitment function.
///
/// Hashes the payload zero-filled up to the unpadded piece size with
/// SHA-256 and reports it as `sha256:<hex>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestPieceDeriver;

impl DigestPieceDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Derive a commitment straight from a byte stream.
    pub async fn digest_reader<R>(&self, mut reader: R) -> Result<DerivedCommitment, ProviderError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut payload_size = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            payload_size += n as u64;
        }

        let padded_piece_size = piece_size_for(payload_size).ok_or_else(|| {
            ProviderError::ExecutionFailed(format!("{payload_size} bytes do not fit in a piece"))
        })?;
        let unpadded_piece_size = unpadded_size(padded_piece_size);
        let mut remaining = unpadded_piece_size.saturating_sub(payload_size);
        buf.fill(0);
        while remaining > 0 {
            let take = usize::try_from(remaining).unwrap_or(usize::MAX).min(buf.len());
            hasher.update(&buf[..take]);
            remaining -= take as u64;
        }

        Ok(DerivedCommitment {
            piece: PieceCid::new(format!("sha256:{}", hex::encode(hasher.finalize()))),
            payload_size,
            padded_piece_size,
            unpadded_piece_size,
        })
    }
}

#[async_trait]
impl PieceCommitmentDeriver for DigestPieceDeriver {
    async fn derive(
        &self,
        address: &ContentAddress,
        store: &dyn ContentStore,
    ) -> Result<DerivedCommitment, ProviderError> {
        let reader = store.resolve(address).await?;
        self.digest_reader(reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryContentStore;

    #[test]
    fn piece_sizes_are_powers_of_two() {
        assert_eq!(piece_size_for(0), Some(128));
        assert_eq!(piece_size_for(127), Some(128));
        assert_eq!(piece_size_for(128), Some(256));
        assert_eq!(piece_size_for(1_000_000), Some(1_048_576));
        assert_eq!(piece_size_for(u64::MAX / 2), None);
    }

    #[tokio::test]
    async fn derivation_is_deterministic() {
        let deriver = DigestPieceDeriver::new();
        let first = deriver.digest_reader(&b"some bytes"[..]).await.unwrap();
        let second = deriver.digest_reader(&b"some bytes"[..]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.payload_size, 10);
        assert_eq!(first.unpadded_piece_size, 127);
        assert_eq!(first.padded_piece_size, 128);
        assert!(first.piece.starts_with("sha256:"));

        let other = deriver.digest_reader(&b"other bytes"[..]).await.unwrap();
        assert_ne!(first.piece, other.piece);
    }

    #[tokio::test]
    async fn derive_reads_through_the_store() {
        let store = MemoryContentStore::new();
        let address = store.insert(b"stored".to_vec());
        let derived = DigestPieceDeriver::new()
            .derive(&address, &store)
            .await
            .unwrap();
        assert_eq!(derived.payload_size, 6);
    }

    #[tokio::test]
    async fn derive_missing_content_fails() {
        let store = MemoryContentStore::new();
        let err = DigestPieceDeriver::new()
            .derive(&ContentAddress::new("missing"), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
