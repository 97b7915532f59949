use common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DedupError {
    /// The upload stream failed before EOF.
    #[error("failed to read upload stream: {0}")]
    StreamRead(#[source] std::io::Error),

    /// The upload stream was not consumed to EOF, so no fingerprint exists.
    #[error("upload stream ended before it was fully read")]
    IncompleteStream,

    #[error("upload exceeds size limit ({actual} > {limit} bytes)")]
    SizeLimitExceeded { actual: u64, limit: u64 },

    #[error("file {0} not found")]
    NotFound(Uuid),

    #[error("blob store unavailable: {0}")]
    BlobStoreUnavailable(#[source] StorageError),

    #[error("registry error: {0}")]
    Registry(#[from] DbErr),

    /// A persisted fingerprint or storage key failed to parse.
    #[error("corrupt registry value: {0}")]
    InvalidFingerprint(String),
}

impl From<StorageError> for DedupError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Source(e) => Self::StreamRead(e),
            StorageError::SizeLimitExceeded { actual, limit } => {
                Self::SizeLimitExceeded { actual, limit }
            }
            StorageError::InvalidHash(msg) | StorageError::InvalidKey(msg) => {
                Self::InvalidFingerprint(msg)
            }
            other => Self::BlobStoreUnavailable(other),
        }
    }
}
