use std::sync::Arc;

use common::storage::{BlobStore, StorageKey};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::registry::RegistryStore;

use super::error::DedupError;

/// What a deletion changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub file_id: Uuid,
    pub fingerprint: String,
    /// Records still sharing the content.
    pub remaining_references: i64,
    /// The permanent blob was deleted.
    pub blob_reclaimed: bool,
    /// Record promoted to canonical original because the deleted one held
    /// that role.
    pub promoted_original: Option<Uuid>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
}

impl LifecycleManager {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Delete a logical file and release its reference to the content.
    ///
    /// The content entry is locked before the record, the same order ingest
    /// uses. When the last reference goes, the entry and the blob are removed
    /// before commit; a failure anywhere rolls everything back and the record
    /// stays.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<Deletion, DedupError> {
        let fingerprint = RegistryStore::new(&self.db)
            .find(id)
            .await?
            .ok_or(DedupError::NotFound(id))?
            .fingerprint;

        let txn = self.db.begin().await?;
        let registry = RegistryStore::new(&txn);

        let entry = registry.content_entry_for_update(&fingerprint).await?;
        // Re-read under lock; a concurrent delete may have won.
        if registry.find_for_update(id).await?.is_none() {
            return Err(DedupError::NotFound(id));
        }

        let mut deletion = Deletion {
            file_id: id,
            fingerprint: fingerprint.clone(),
            remaining_references: 0,
            blob_reclaimed: false,
            promoted_original: None,
        };

        let remaining = match &entry {
            Some(_) => registry.decrement_ref_count(&fingerprint).await?,
            None => None,
        };
        let (Some(entry), Some(remaining)) = (entry, remaining) else {
            warn!(
                file_id = %id,
                %fingerprint,
                "Dangling reference: no live content entry, removing record only"
            );
            registry.delete(id).await?;
            txn.commit().await?;
            return Ok(deletion);
        };

        registry.delete(id).await?;
        deletion.remaining_references = remaining;

        if remaining == 0 {
            registry.remove_content_entry(&fingerprint).await?;
            let key = StorageKey::parse(&entry.storage_key)
                .map_err(|e| DedupError::InvalidFingerprint(e.to_string()))?;
            deletion.blob_reclaimed = self
                .blobs
                .delete(&key)
                .await
                .map_err(DedupError::BlobStoreUnavailable)?;
            if !deletion.blob_reclaimed {
                warn!(%fingerprint, "Blob was already gone when its last reference was deleted");
            }
        } else if entry.original_file_id == id {
            deletion.promoted_original = registry.reassign_original(&fingerprint).await?;
        }

        txn.commit().await?;

        info!(
            file_id = %id,
            %fingerprint,
            remaining_references = deletion.remaining_references,
            blob_reclaimed = deletion.blob_reclaimed,
            promoted_original = ?deletion.promoted_original,
            "Deleted file"
        );

        Ok(deletion)
    }
}
