use std::sync::Arc;

use common::storage::BlobStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::dedup::{DedupCoordinator, LifecycleManager};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob_store: Arc<dyn BlobStore>,
    pub config: Arc<AppConfig>,
    pub dedup: DedupCoordinator,
    pub lifecycle: LifecycleManager,
}

impl AppState {
    pub fn new(db: DatabaseConnection, blob_store: Arc<dyn BlobStore>, config: AppConfig) -> Self {
        Self {
            dedup: DedupCoordinator::new(db.clone(), Arc::clone(&blob_store)),
            lifecycle: LifecycleManager::new(db.clone(), Arc::clone(&blob_store)),
            db,
            blob_store,
            config: Arc::new(config),
        }
    }
}
