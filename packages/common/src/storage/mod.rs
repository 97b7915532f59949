mod error;
mod hash;
mod key;
mod traits;

pub mod filesystem;
pub mod fingerprint;

pub use error::StorageError;
pub use fingerprint::{FingerprintEngine, FingerprintTap, Fingerprinted, HashingReader};
pub use hash::Fingerprint;
pub use key::{StorageKey, TempKey};
pub use traits::{BlobStore, BoxReader, Finalized, TempBlob};
