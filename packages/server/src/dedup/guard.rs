use std::sync::Arc;

use common::storage::{BlobStore, StorageKey, TempKey};
use tracing::warn;

/// Discards a temporary blob unless the ingest that wrote it reached a
/// terminal state.
///
/// Dropping the guard (ingest future cancelled, early return on error)
/// schedules the discard on the current runtime.
pub(crate) struct TempBlobGuard {
    store: Arc<dyn BlobStore>,
    key: TempKey,
    defused: bool,
}

impl TempBlobGuard {
    pub(crate) fn new(store: Arc<dyn BlobStore>, key: TempKey) -> Self {
        Self {
            store,
            key,
            defused: false,
        }
    }

    pub(crate) fn key(&self) -> &TempKey {
        &self.key
    }

    /// The temp blob was finalized or discarded elsewhere.
    pub(crate) fn defuse(&mut self) {
        self.defused = true;
    }

    /// Discard the temp blob now and defuse.
    pub(crate) async fn discard(&mut self) {
        self.defused = true;
        if let Err(e) = self.store.discard(&self.key).await {
            warn!(temp = %self.key, error = %e, "Failed to discard temp blob");
        }
    }
}

impl Drop for TempBlobGuard {
    fn drop(&mut self) {
        if self.defused {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = self.key;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.discard(&key).await {
                        warn!(temp = %key, error = %e, "Failed to discard temp blob");
                    }
                });
            }
            Err(_) => warn!(temp = %key, "No runtime to discard temp blob"),
        }
    }
}

/// Deletes a permanent blob promoted by an ingest whose registration has not
/// committed yet.
///
/// Only armed when `finalize` actually created the blob; an adopted blob
/// predates the ingest and is left alone.
pub(crate) struct PromotedBlobGuard {
    store: Arc<dyn BlobStore>,
    key: StorageKey,
    armed: bool,
}

impl PromotedBlobGuard {
    pub(crate) fn new(store: Arc<dyn BlobStore>, key: StorageKey) -> Self {
        Self {
            store,
            key,
            armed: true,
        }
    }

    /// The registration committed; the blob now belongs to its entry.
    pub(crate) fn keep(mut self) {
        self.armed = false;
    }

    /// Delete the blob now, while the caller still holds the entry lock.
    pub(crate) async fn reclaim(mut self) {
        self.armed = false;
        match self.store.delete(&self.key).await {
            Ok(_) => warn!(key = %self.key, "Reclaimed blob of failed ingest"),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to reclaim blob of failed ingest")
            }
        }
    }
}

impl Drop for PromotedBlobGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        warn!(%key, error = %e, "Failed to reclaim blob of cancelled ingest");
                    }
                });
            }
            Err(_) => warn!(%key, "No runtime to reclaim blob of cancelled ingest"),
        }
    }
}
