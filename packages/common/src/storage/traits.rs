use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::key::{StorageKey, TempKey};

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A blob written under a temporary key, not yet visible under any
/// permanent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempBlob {
    pub key: TempKey,
    pub size: u64,
}

/// Outcome of promoting a temporary blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// The temporary blob now lives under the permanent key.
    Promoted,
    /// The permanent key already held the content; the temporary blob was
    /// dropped.
    AlreadyPresent,
}

/// Key-value blob storage. The store knows nothing about fingerprints or
/// reference counts; callers decide which permanent key a blob lands under.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream bytes into a new temporary blob.
    ///
    /// Failures while reading `reader` surface as [`StorageError::Source`].
    /// No temporary blob survives a failed or cancelled call.
    async fn put_temp(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<TempBlob, StorageError>;

    /// Move a temporary blob under its permanent key.
    ///
    /// Idempotent per key: when the permanent blob already exists the
    /// temporary one is discarded and [`Finalized::AlreadyPresent`] returned.
    async fn finalize(&self, temp: &TempKey, key: &StorageKey) -> Result<Finalized, StorageError>;

    /// Drop a temporary blob. Returns `false` if it did not exist.
    async fn discard(&self, temp: &TempKey) -> Result<bool, StorageError>;

    /// Retrieve all bytes of a permanent blob.
    async fn get(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve a permanent blob as a streaming reader.
    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError>;

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Delete a permanent blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Size of a permanent blob in bytes.
    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError>;
}
