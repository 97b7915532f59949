//! Deduplicating ingest and reference-counted deletion.
//!
//! Identical bytes are stored once. Each upload still gets its own
//! `logical_file` row; rows sharing a fingerprint share one `content_entry`
//! and one permanent blob.
//!
//! Per-fingerprint consistency comes from the database: both
//! [`DedupCoordinator::ingest`] and [`LifecycleManager::delete`] run in a
//! single transaction and take the `content_entry` row lock before touching
//! anything else for that fingerprint. Blob promotion and reclamation happen
//! while that lock is held, so the blob store never disagrees with a
//! committed registry state except for an orphaned permanent blob left by a
//! crash between finalize and commit, which the next identical upload
//! adopts.

mod coordinator;
mod error;
mod guard;
mod lifecycle;

pub use coordinator::{DedupCoordinator, Ingested, UploadMeta};
pub use error::DedupError;
pub use lifecycle::{Deletion, LifecycleManager};
