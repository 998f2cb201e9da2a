use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use delta_core::ContentAddress;
use sha2::{Digest, Sha256};
use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::ProviderError;

/// Byte stream over a piece of stored content.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Content-addressed storage holding the local copy of submitted bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Open the bytes stored under `address`.
    async fn resolve(&self, address: &ContentAddress) -> Result<ContentReader, ProviderError>;

    /// Delete the local copy stored under `address`.
    ///
    /// Removing an address that is not present succeeds.
    async fn remove(&self, address: &ContentAddress) -> Result<(), ProviderError>;
}

/// Compute the address under which `data` is stored.
pub fn content_address(data: &[u8]) -> ContentAddress {
    ContentAddress::new(hex::encode(Sha256::digest(data)))
}

/// A [`ContentStore`] keeping one file per address under a root directory.
///
/// Addresses are the hex SHA-256 of the stored bytes.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` and return its address.
    pub async fn put(&self, data: Bytes) -> Result<ContentAddress, ProviderError> {
        let address = content_address(&data);
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(&address)?;
        tokio::fs::write(&path, &data).await?;
        debug!(address = %address, size = data.len(), "content stored");
        Ok(address)
    }

    fn path_for(&self, address: &ContentAddress) -> Result<PathBuf, ProviderError> {
        let valid = !address.is_empty()
            && address
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ProviderError::NotFound(format!(
                "invalid content address: {address}"
            )));
        }
        Ok(self.root.join(address.as_str()))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn resolve(&self, address: &ContentAddress) -> Result<ContentReader, ProviderError> {
        let path = self.path_for(address)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ProviderError::NotFound(format!("content {address}"))
            }
            _ => ProviderError::from(e),
        })?;
        Ok(Box::new(file))
    }

    async fn remove(&self, address: &ContentAddress) -> Result<(), ProviderError> {
        let path = self.path_for(address)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(address = %address, "local copy removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn put_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("blocks"));

        let address = store.put(Bytes::from_static(b"hello delta")).await.unwrap();
        assert_eq!(address, content_address(b"hello delta"));

        let mut reader = store.resolve(&address).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello delta");
    }

    #[tokio::test]
    async fn resolve_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let err = store
            .resolve(&ContentAddress::new("abc123"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let address = store.put(Bytes::from_static(b"bytes")).await.unwrap();

        store.remove(&address).await.unwrap();
        store.remove(&address).await.unwrap();
        assert!(store.resolve(&address).await.is_err());
    }

    #[tokio::test]
    async fn rejects_path_like_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let err = store
            .remove(&ContentAddress::new("../etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
