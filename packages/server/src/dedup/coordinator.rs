use std::sync::Arc;

use chrono::Utc;
use common::storage::{
    BlobStore, Finalized, FingerprintEngine, Fingerprinted, StorageKey,
};
use sea_orm::{DatabaseConnection, DbErr, Set, TransactionTrait};
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::entity::logical_file;
use crate::registry::{NewContent, Registration, RegistryStore};

use super::error::DedupError;
use super::guard::{PromotedBlobGuard, TempBlobGuard};

/// Descriptive metadata of an upload.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub display_name: String,
    pub media_type: String,
}

/// Result of a successful ingest.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub file: logical_file::Model,
    /// Reference count of the content right after this ingest committed.
    pub reference_count: i64,
}

impl Ingested {
    /// Bytes this upload did not add to physical storage.
    pub fn storage_saved(&self) -> i64 {
        if self.file.is_duplicate {
            self.file.byte_size
        } else {
            0
        }
    }
}

#[derive(Clone)]
pub struct DedupCoordinator {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
}

impl DedupCoordinator {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Store an upload, linking it to existing content when the bytes are
    /// already known.
    ///
    /// The stream is hashed while it is written to a temporary blob, so it is
    /// read exactly once. Registration, blob promotion and the record insert
    /// then happen in one transaction. On any error, and when the returned
    /// future is dropped early, nothing is committed, the temporary blob is
    /// discarded and a permanent blob promoted by this call is deleted.
    #[instrument(skip(self, reader, meta), fields(display_name = %meta.display_name))]
    pub async fn ingest<R>(&self, reader: R, meta: UploadMeta) -> Result<Ingested, DedupError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let (mut tapped, tap) = FingerprintEngine::tap(reader);
        let temp = self.blobs.put_temp(&mut tapped).await?;
        let mut guard = TempBlobGuard::new(Arc::clone(&self.blobs), temp.key);
        drop(tapped);

        let Fingerprinted { fingerprint, size } =
            tap.finish().ok_or(DedupError::IncompleteStream)?;
        let byte_size = i64::try_from(size).map_err(|_| DedupError::SizeLimitExceeded {
            actual: size,
            limit: i64::MAX as u64,
        })?;

        let storage_key = StorageKey::for_fingerprint(&fingerprint);
        let fingerprint = fingerprint.to_hex();
        let candidate_id = Uuid::now_v7();

        let txn = self.db.begin().await?;
        let registry = RegistryStore::new(&txn);

        let registration = registry
            .compare_and_register(&NewContent {
                fingerprint: fingerprint.clone(),
                storage_key: storage_key.to_string(),
                byte_size,
                candidate_id,
            })
            .await?;

        let mut promoted = None;
        let (original_file_id, reference_count) = match registration {
            Registration::New => {
                let outcome = self.blobs.finalize(guard.key(), &storage_key).await?;
                guard.defuse();
                match outcome {
                    Finalized::Promoted => {
                        promoted = Some(PromotedBlobGuard::new(
                            Arc::clone(&self.blobs),
                            storage_key.clone(),
                        ));
                    }
                    Finalized::AlreadyPresent => {
                        debug!(%fingerprint, "Adopted existing blob for new content entry");
                    }
                }
                (None, 1)
            }
            Registration::Existing { original_file_id } => {
                if self.blobs.exists(&storage_key).await? {
                    guard.discard().await;
                } else {
                    warn!(
                        %fingerprint,
                        "Registered content has no blob, restoring it from this upload"
                    );
                    self.blobs.finalize(guard.key(), &storage_key).await?;
                    guard.defuse();
                }

                let count = registry
                    .increment_ref_count(&fingerprint)
                    .await?
                    .ok_or_else(|| {
                        DbErr::Custom(format!("content entry {fingerprint} vanished under lock"))
                    })?;
                (Some(original_file_id), count)
            }
        };

        let inserted = registry
            .insert(logical_file::ActiveModel {
                id: Set(candidate_id),
                display_name: Set(meta.display_name),
                media_type: Set(meta.media_type),
                byte_size: Set(byte_size),
                fingerprint: Set(fingerprint.clone()),
                is_duplicate: Set(original_file_id.is_some()),
                original_file_id: Set(original_file_id),
                created_at: Set(Utc::now()),
            })
            .await;

        // A blob promoted by this ingest must not outlive a rolled-back entry.
        let file = match inserted {
            Ok(file) => file,
            Err(e) => {
                if let Some(blob) = promoted {
                    blob.reclaim().await;
                }
                return Err(e.into());
            }
        };
        if let Err(e) = txn.commit().await {
            if let Some(blob) = promoted {
                blob.reclaim().await;
            }
            return Err(e.into());
        }
        if let Some(blob) = promoted {
            blob.keep();
        }

        if file.is_duplicate {
            info!(
                file_id = %file.id,
                %fingerprint,
                original_file_id = ?file.original_file_id,
                reference_count,
                "Linked upload to existing content"
            );
        } else {
            info!(file_id = %file.id, %fingerprint, size, "Stored new content");
        }

        Ok(Ingested {
            file,
            reference_count,
        })
    }
}
