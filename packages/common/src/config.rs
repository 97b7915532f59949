use std::path::PathBuf;

use serde::Deserialize;

/// Blob storage configuration shared by the server and its tooling.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store. Default: "./data/blobs".
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Largest accepted upload in bytes. Default: 128 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    /// Temporary blobs older than this are purged at startup. Default: 3600.
    #[serde(default = "default_stale_temp_secs")]
    pub stale_temp_secs: u64,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_max_blob_size() -> u64 {
    128 * 1024 * 1024
}
fn default_stale_temp_secs() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_blob_size: default_max_blob_size(),
            stale_temp_secs: default_stale_temp_secs(),
        }
    }
}
