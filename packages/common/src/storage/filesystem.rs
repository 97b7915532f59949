use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use super::error::StorageError;
use super::key::{StorageKey, TempKey};
use super::traits::{BlobStore, BoxReader, Finalized, TempBlob};

const TEMP_DIR: &str = ".tmp";

/// Filesystem-backed blob store.
///
/// Permanent blobs live in a Git-style sharded layout:
/// `{base_path}/{first 2 hex chars}/{remaining 62 hex chars}`.
/// Temporary blobs live in `{base_path}/.tmp/{uuid}` and are promoted with a
/// rename, so finalizing never copies bytes.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(TEMP_DIR)).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    fn blob_path(&self, key: &StorageKey) -> PathBuf {
        let (shard, name) = key.shard();
        self.base_path.join(shard).join(name)
    }

    fn temp_path(&self, key: &TempKey) -> PathBuf {
        self.base_path.join(TEMP_DIR).join(key.to_string())
    }

    /// Remove temporary blobs older than `max_age`, left behind by a crashed
    /// process. Returns how many were removed.
    pub async fn purge_stale_temp(&self, max_age: Duration) -> Result<usize, StorageError> {
        let mut entries = fs::read_dir(self.base_path.join(TEMP_DIR)).await?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}

/// Removes a half-written temp file if `put_temp` is cancelled or fails.
struct TempFileGuard<'a> {
    path: &'a Path,
    defused: bool,
}

impl TempFileGuard<'_> {
    fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for TempFileGuard<'_> {
    fn drop(&mut self) {
        if !self.defused
            && let Err(e) = std::fs::remove_file(self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove temp blob");
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_temp(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<TempBlob, StorageError> {
        let key = TempKey::generate();
        let temp_path = self.temp_path(&key);
        let mut temp_file = fs::File::create(&temp_path).await?;
        let mut guard = TempFileGuard {
            path: &temp_path,
            defused: false,
        };

        let mut total_bytes: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

        loop {
            let n = reader.read(&mut buf).await.map_err(StorageError::Source)?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        temp_file.sync_all().await?;
        drop(temp_file);

        guard.defuse();
        debug!(temp = %key, size = total_bytes, "Wrote temp blob");

        Ok(TempBlob {
            key,
            size: total_bytes,
        })
    }

    async fn finalize(&self, temp: &TempKey, key: &StorageKey) -> Result<Finalized, StorageError> {
        let temp_path = self.temp_path(temp);
        if !fs::try_exists(&temp_path).await? {
            return Err(StorageError::NotFound(format!("temp blob {temp}")));
        }

        let blob_path = self.blob_path(key);
        if fs::try_exists(&blob_path).await? {
            let _ = fs::remove_file(&temp_path).await;
            return Ok(Finalized::AlreadyPresent);
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(Finalized::Promoted)
    }

    async fn discard(&self, temp: &TempKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.temp_path(temp)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.blob_path(key)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        match fs::metadata(self.blob_path(key)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
