use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use common::storage::{
    BlobStore, BoxReader, Finalized, Fingerprint, StorageError, StorageKey, TempBlob, TempKey,
};
use sea_orm::{ConnectionTrait, EntityTrait};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use uuid::Uuid;

use filevault::dedup::DedupError;
use filevault::entity::content_entry;
use filevault::registry::RegistryStore;

use crate::common::{HELLO_FINGERPRINT, TestVault, meta};

/// Reader that yields `ok_bytes` bytes and then fails.
struct BrokenReader {
    ok_bytes: usize,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.ok_bytes == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            )));
        }
        let n = self.ok_bytes.min(buf.remaining());
        buf.put_slice(&vec![b'x'; n]);
        self.ok_bytes -= n;
        Poll::Ready(Ok(()))
    }
}

/// Filesystem store whose `finalize` can be made to fail.
struct FlakyStore {
    inner: Arc<dyn BlobStore>,
    fail_finalize: AtomicBool,
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put_temp(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<TempBlob, StorageError> {
        self.inner.put_temp(reader).await
    }

    async fn finalize(&self, temp: &TempKey, key: &StorageKey) -> Result<Finalized, StorageError> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other("disk unplugged")));
        }
        self.inner.finalize(temp, key).await
    }

    async fn discard(&self, temp: &TempKey) -> Result<bool, StorageError> {
        self.inner.discard(temp).await
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        self.inner.get_stream(key).await
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        self.inner.delete(key).await
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        self.inner.size(key).await
    }
}

fn hello_key() -> StorageKey {
    StorageKey::for_fingerprint(&Fingerprint::from_hex(HELLO_FINGERPRINT).unwrap())
}

mod ingest {
    use super::*;

    #[tokio::test]
    async fn first_upload_is_original() {
        let vault = TestVault::new().await;

        let ingested = vault.upload("a.txt", b"hello").await;

        assert_eq!(ingested.file.fingerprint, HELLO_FINGERPRINT);
        assert_eq!(ingested.file.byte_size, 5);
        assert!(!ingested.file.is_duplicate);
        assert!(ingested.file.original_file_id.is_none());
        assert_eq!(ingested.reference_count, 1);
        assert_eq!(ingested.storage_saved(), 0);

        let entry = vault.entry(HELLO_FINGERPRINT).await.unwrap();
        assert_eq!(entry.reference_count, 1);
        assert_eq!(entry.original_file_id, ingested.file.id);
        assert_eq!(entry.storage_key, hello_key().to_string());
        assert_eq!(vault.blob_count(), 1);
        assert_eq!(vault.store.get(&hello_key()).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn second_identical_upload_links_to_first() {
        let vault = TestVault::new().await;

        let a = vault.upload("a.txt", b"hello").await;
        let b = vault.upload("b.txt", b"hello").await;

        assert!(b.file.is_duplicate);
        assert_eq!(b.file.original_file_id, Some(a.file.id));
        assert_eq!(b.file.display_name, "b.txt");
        assert_eq!(b.reference_count, 2);
        assert_eq!(b.storage_saved(), 5);
        assert!(b.file.created_at >= a.file.created_at);

        assert_eq!(vault.entry(HELLO_FINGERPRINT).await.unwrap().reference_count, 2);
        assert_eq!(vault.blob_count(), 1);
        assert_eq!(vault.temp_count(), 0);
        assert_eq!(vault.file_count().await, 2);
    }

    #[tokio::test]
    async fn fingerprint_ignores_name_and_media_type() {
        let vault = TestVault::new().await;

        let a = vault.upload("report.pdf", b"same bytes").await;
        let b = vault
            .dedup
            .ingest(
                Cursor::new(b"same bytes".to_vec()),
                filevault::dedup::UploadMeta {
                    display_name: "other.bin".into(),
                    media_type: "application/octet-stream".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(a.file.fingerprint, b.file.fingerprint);
        assert!(b.file.is_duplicate);
        assert_eq!(b.file.media_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn different_content_is_never_linked() {
        let vault = TestVault::new().await;

        let a = vault.upload("a.txt", b"alpha").await;
        let b = vault.upload("a.txt", b"beta").await;

        assert_ne!(a.file.fingerprint, b.file.fingerprint);
        assert!(!a.file.is_duplicate);
        assert!(!b.file.is_duplicate);
        assert_eq!(vault.entry_count().await, 2);
        assert_eq!(vault.blob_count(), 2);
    }

    #[tokio::test]
    async fn empty_content_deduplicates() {
        let vault = TestVault::new().await;

        let a = vault.upload("empty1", b"").await;
        let b = vault.upload("empty2", b"").await;

        assert_eq!(
            a.file.fingerprint,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(a.file.byte_size, 0);
        assert!(b.file.is_duplicate);
        assert_eq!(b.reference_count, 2);
        assert_eq!(vault.blob_count(), 1);
    }

    #[tokio::test]
    async fn large_content_spanning_many_buffers() {
        let vault = TestVault::new().await;
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();

        let ingested = vault.upload("big.bin", &data).await;

        assert_eq!(ingested.file.fingerprint, Fingerprint::compute(&data).to_hex());
        assert_eq!(ingested.file.byte_size, data.len() as i64);
        let key = StorageKey::parse(
            &vault.entry(&ingested.file.fingerprint).await.unwrap().storage_key,
        )
        .unwrap();
        assert_eq!(vault.store.get(&key).await.unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_uploads_share_one_blob() {
        const N: usize = 12;
        let vault = Arc::new(TestVault::new().await);

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let vault = Arc::clone(&vault);
                tokio::spawn(async move {
                    vault
                        .dedup
                        .ingest(Cursor::new(b"hello".to_vec()), meta(&format!("{i}.txt")))
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().expect("every upload succeeds"));
        }

        let originals: Vec<_> = results.iter().filter(|r| !r.file.is_duplicate).collect();
        assert_eq!(originals.len(), 1);
        let original_id = originals[0].file.id;
        for r in results.iter().filter(|r| r.file.is_duplicate) {
            assert_eq!(r.file.original_file_id, Some(original_id));
        }

        let entry = vault.entry(HELLO_FINGERPRINT).await.unwrap();
        assert_eq!(entry.reference_count, N as i64);
        assert_eq!(entry.original_file_id, original_id);
        assert_eq!(vault.file_count().await, N as u64);
        assert_eq!(vault.blob_count(), 1);
        assert_eq!(vault.settled_temp_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_uploads_stay_separate() {
        let vault = Arc::new(TestVault::new().await);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let vault = Arc::clone(&vault);
                tokio::spawn(async move {
                    // Two uploads per content.
                    let body = format!("content-{}", i % 4).into_bytes();
                    vault.dedup.ingest(Cursor::new(body), meta("f")).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(vault.entry_count().await, 4);
        assert_eq!(vault.blob_count(), 4);
        let stats = RegistryStore::new(&vault.db).stats().await.unwrap();
        assert_eq!(stats.total_files, 8);
        assert_eq!(stats.duplicate_count, 4);
        assert_eq!(stats.unique_contents, 4);
    }
}

mod ingest_failures {
    use super::*;

    #[tokio::test]
    async fn broken_stream_leaves_nothing_behind() {
        let vault = TestVault::new().await;

        let err = vault
            .dedup
            .ingest(BrokenReader { ok_bytes: 100_000 }, meta("broken"))
            .await
            .unwrap_err();

        assert!(matches!(err, DedupError::StreamRead(_)), "got {err:?}");
        assert_eq!(vault.file_count().await, 0);
        assert_eq!(vault.entry_count().await, 0);
        assert_eq!(vault.blob_count(), 0);
        assert_eq!(vault.settled_temp_count().await, 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let vault =
            TestVault::with_store(8, |store| store as Arc<dyn BlobStore>).await;

        let err = vault
            .dedup
            .ingest(Cursor::new(vec![0u8; 9]), meta("big"))
            .await
            .unwrap_err();

        assert!(
            matches!(err, DedupError::SizeLimitExceeded { actual: 9, limit: 8 }),
            "got {err:?}"
        );
        assert_eq!(vault.file_count().await, 0);
        assert_eq!(vault.settled_temp_count().await, 0);

        let ok = vault.upload("fits", &[0u8; 8]).await;
        assert_eq!(ok.file.byte_size, 8);
    }

    #[tokio::test]
    async fn failed_finalize_rolls_back_registration() {
        let flaky = Arc::new(std::sync::OnceLock::<Arc<FlakyStore>>::new());
        let slot = Arc::clone(&flaky);
        let vault = TestVault::with_store(1024, move |store| {
            let wrapped = Arc::new(FlakyStore {
                inner: store,
                fail_finalize: AtomicBool::new(true),
            });
            let _ = slot.set(Arc::clone(&wrapped));
            wrapped as Arc<dyn BlobStore>
        })
        .await;

        let err = vault
            .dedup
            .ingest(Cursor::new(b"hello".to_vec()), meta("a.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, DedupError::BlobStoreUnavailable(_)), "got {err:?}");
        assert_eq!(vault.file_count().await, 0);
        assert_eq!(vault.entry_count().await, 0);
        assert_eq!(vault.blob_count(), 0);
        assert_eq!(vault.settled_temp_count().await, 0);

        // Nothing was committed, so the retry is a fresh original.
        flaky.get().unwrap().fail_finalize.store(false, Ordering::SeqCst);
        let retry = vault.upload("a.txt", b"hello").await;
        assert!(!retry.file.is_duplicate);
        assert_eq!(retry.reference_count, 1);
    }

    #[tokio::test]
    async fn cancelled_upload_leaves_nothing_behind() {
        let vault = TestVault::new().await;
        let (mut tx, rx) = tokio::io::duplex(1024);
        tx.write_all(b"partial upload").await.unwrap();

        // The writer stays open, so the ingest blocks until the timeout drops it.
        let result = tokio::time::timeout(
            Duration::from_millis(200),
            vault.dedup.ingest(rx, meta("slow.bin")),
        )
        .await;
        assert!(result.is_err(), "ingest should still be waiting for bytes");
        drop(tx);

        assert_eq!(vault.file_count().await, 0);
        assert_eq!(vault.entry_count().await, 0);
        assert_eq!(vault.blob_count(), 0);
        assert_eq!(vault.settled_temp_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_restores_missing_blob() {
        let vault = TestVault::new().await;

        vault.upload("a.txt", b"hello").await;
        assert!(vault.store.delete(&hello_key()).await.unwrap());

        let b = vault.upload("b.txt", b"hello").await;

        assert!(b.file.is_duplicate);
        assert_eq!(b.reference_count, 2);
        assert_eq!(vault.store.get(&hello_key()).await.unwrap(), b"hello");
        assert_eq!(vault.temp_count(), 0);
    }

    #[tokio::test]
    async fn new_entry_adopts_orphaned_blob() {
        let vault = TestVault::new().await;

        // A blob with no registry entry, as left by a crash after finalize.
        let mut reader = Cursor::new(b"hello".to_vec());
        let temp = vault.store.put_temp(&mut reader).await.unwrap();
        vault.store.finalize(&temp.key, &hello_key()).await.unwrap();

        let a = vault.upload("a.txt", b"hello").await;

        assert!(!a.file.is_duplicate);
        assert_eq!(vault.blob_count(), 1);
        assert_eq!(vault.temp_count(), 0);
    }

    async fn break_file_table(vault: &TestVault) {
        vault
            .db
            .execute_unprepared("DROP TABLE logical_file")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_record_insert_reclaims_promoted_blob() {
        let vault = TestVault::new().await;
        break_file_table(&vault).await;

        let err = vault
            .dedup
            .ingest(Cursor::new(b"hello".to_vec()), meta("a.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, DedupError::Registry(_)));
        assert_eq!(vault.entry_count().await, 0);
        assert_eq!(vault.blob_count(), 0);
        assert_eq!(vault.settled_temp_count().await, 0);
    }

    #[tokio::test]
    async fn failed_record_insert_keeps_adopted_blob() {
        let vault = TestVault::new().await;
        let mut reader = Cursor::new(b"hello".to_vec());
        let temp = vault.store.put_temp(&mut reader).await.unwrap();
        vault.store.finalize(&temp.key, &hello_key()).await.unwrap();
        break_file_table(&vault).await;

        let result = vault
            .dedup
            .ingest(Cursor::new(b"hello".to_vec()), meta("a.txt"))
            .await;

        assert!(result.is_err());
        assert_eq!(vault.entry_count().await, 0);
        // The blob predates the failed ingest.
        assert_eq!(vault.blob_count(), 1);
    }

    #[tokio::test]
    async fn failed_duplicate_insert_keeps_shared_blob() {
        let vault = TestVault::new().await;
        vault.upload("a.txt", b"hello").await;
        break_file_table(&vault).await;

        let result = vault
            .dedup
            .ingest(Cursor::new(b"hello".to_vec()), meta("b.txt"))
            .await;

        assert!(result.is_err());
        assert_eq!(vault.entry(HELLO_FINGERPRINT).await.unwrap().reference_count, 1);
        assert_eq!(vault.blob_count(), 1);
        assert_eq!(vault.settled_temp_count().await, 0);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn deleting_a_duplicate_keeps_the_blob() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;
        let b = vault.upload("b.txt", b"hello").await;
        let c = vault.upload("c.txt", b"hello").await;

        let deletion = vault.lifecycle.delete(b.file.id).await.unwrap();

        assert_eq!(deletion.remaining_references, 2);
        assert!(!deletion.blob_reclaimed);
        assert!(deletion.promoted_original.is_none());
        assert!(vault.file(b.file.id).await.is_none());

        let entry = vault.entry(HELLO_FINGERPRINT).await.unwrap();
        assert_eq!(entry.reference_count, 2);
        assert_eq!(entry.original_file_id, a.file.id);
        assert_eq!(
            vault.file(c.file.id).await.unwrap().original_file_id,
            Some(a.file.id)
        );
        assert_eq!(vault.blob_count(), 1);
    }

    #[tokio::test]
    async fn deleting_the_last_reference_reclaims_storage() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;
        let b = vault.upload("b.txt", b"hello").await;

        vault.lifecycle.delete(b.file.id).await.unwrap();
        let deletion = vault.lifecycle.delete(a.file.id).await.unwrap();

        assert_eq!(deletion.remaining_references, 0);
        assert!(deletion.blob_reclaimed);
        assert!(vault.entry(HELLO_FINGERPRINT).await.is_none());
        assert_eq!(vault.blob_count(), 0);
        assert_eq!(vault.file_count().await, 0);

        // The content is new again afterwards.
        let again = vault.upload("again.txt", b"hello").await;
        assert!(!again.file.is_duplicate);
        assert_eq!(vault.blob_count(), 1);
    }

    #[tokio::test]
    async fn deleting_the_original_promotes_the_oldest_survivor() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;
        let b = vault.upload("b.txt", b"hello").await;
        let c = vault.upload("c.txt", b"hello").await;

        let deletion = vault.lifecycle.delete(a.file.id).await.unwrap();

        assert_eq!(deletion.promoted_original, Some(b.file.id));
        assert_eq!(deletion.remaining_references, 2);
        assert!(!deletion.blob_reclaimed);

        let b_now = vault.file(b.file.id).await.unwrap();
        assert!(!b_now.is_duplicate);
        assert!(b_now.original_file_id.is_none());

        let c_now = vault.file(c.file.id).await.unwrap();
        assert!(c_now.is_duplicate);
        assert_eq!(c_now.original_file_id, Some(b.file.id));

        let entry = vault.entry(HELLO_FINGERPRINT).await.unwrap();
        assert_eq!(entry.original_file_id, b.file.id);
        assert_eq!(vault.store.get(&hello_key()).await.unwrap(), b"hello");

        // New duplicates now link to the promoted record.
        let d = vault.upload("d.txt", b"hello").await;
        assert_eq!(d.file.original_file_id, Some(b.file.id));
    }

    #[tokio::test]
    async fn hello_walkthrough() {
        let vault = TestVault::new().await;

        let a = vault.upload("a.txt", b"hello").await;
        assert!(!a.file.is_duplicate);

        let b = vault.upload("b.txt", b"hello").await;
        assert!(b.file.is_duplicate);
        assert_eq!(b.file.original_file_id, Some(a.file.id));
        assert_eq!(b.storage_saved(), 5);

        vault.lifecycle.delete(a.file.id).await.unwrap();

        assert_eq!(vault.store.get(&hello_key()).await.unwrap(), b"hello");
        let canonical = RegistryStore::new(&vault.db)
            .find_by_fingerprint(HELLO_FINGERPRINT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(canonical.id, b.file.id);
        assert!(!canonical.is_duplicate);

        let stats = RegistryStore::new(&vault.db).stats().await.unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.storage_saved, 0);
        assert_eq!(stats.physical_size, 5);
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let vault = TestVault::new().await;
        let id = Uuid::now_v7();

        let err = vault.lifecycle.delete(id).await.unwrap_err();

        assert!(matches!(err, DedupError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn deleting_twice_is_not_found() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;

        vault.lifecycle.delete(a.file.id).await.unwrap();
        let err = vault.lifecycle.delete(a.file.id).await.unwrap_err();

        assert!(matches!(err, DedupError::NotFound(_)));
    }

    #[tokio::test]
    async fn dangling_reference_removes_only_the_record() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;
        content_entry::Entity::delete_by_id(HELLO_FINGERPRINT.to_owned())
            .exec(&vault.db)
            .await
            .unwrap();

        let deletion = vault.lifecycle.delete(a.file.id).await.unwrap();

        assert!(!deletion.blob_reclaimed);
        assert!(vault.file(a.file.id).await.is_none());
        // The blob is left for a later upload to adopt.
        assert_eq!(vault.blob_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deletes_reclaim_exactly_once() {
        let vault = Arc::new(TestVault::new().await);
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(vault.upload(&format!("{i}.txt"), b"hello").await.file.id);
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let vault = Arc::clone(&vault);
                tokio::spawn(async move { vault.lifecycle.delete(id).await })
            })
            .collect();

        let mut reclaimed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().blob_reclaimed {
                reclaimed += 1;
            }
        }

        assert_eq!(reclaimed, 1);
        assert_eq!(vault.file_count().await, 0);
        assert_eq!(vault.entry_count().await, 0);
        assert_eq!(vault.blob_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn uploads_racing_deletes_keep_counts_consistent() {
        let vault = Arc::new(TestVault::new().await);
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(vault.upload(&format!("old-{i}"), b"hello").await.file.id);
        }

        let mut handles = Vec::new();
        for id in ids {
            let vault = Arc::clone(&vault);
            handles.push(tokio::spawn(async move {
                vault.lifecycle.delete(id).await.map(|_| ())
            }));
        }
        for i in 0..4 {
            let vault = Arc::clone(&vault);
            handles.push(tokio::spawn(async move {
                vault
                    .dedup
                    .ingest(Cursor::new(b"hello".to_vec()), meta(&format!("new-{i}")))
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let entry = vault.entry(HELLO_FINGERPRINT).await.unwrap();
        assert_eq!(entry.reference_count, 4);
        assert_eq!(vault.file_count().await, 4);
        assert!(vault.file(entry.original_file_id).await.is_some());
        assert_eq!(vault.store.get(&hello_key()).await.unwrap(), b"hello");

        let originals = RegistryStore::new(&vault.db)
            .list(
                &filevault::registry::FileFilter {
                    is_duplicate: Some(false),
                    ..Default::default()
                },
                1,
                100,
            )
            .await
            .unwrap()
            .0;
        assert_eq!(originals.len(), 1);
        assert_eq!(originals[0].id, entry.original_file_id);
    }
}

mod registry {
    use super::*;
    use filevault::registry::FileFilter;

    #[tokio::test]
    async fn list_filters_and_pages_newest_first() {
        let vault = TestVault::new().await;
        let first = vault.upload("Quarterly Report.pdf", b"q1").await;
        let second = vault.upload("notes_2024.txt", b"notes").await;
        let third = vault.upload("copy.txt", b"notes").await;

        let registry = RegistryStore::new(&vault.db);

        let (all, total) = registry.list(&FileFilter::default(), 1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            all.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![third.file.id, second.file.id]
        );
        let (rest, _) = registry.list(&FileFilter::default(), 2, 2).await.unwrap();
        assert_eq!(rest[0].id, first.file.id);

        let search = FileFilter {
            search: Some("REPORT".into()),
            ..Default::default()
        };
        let (found, total) = registry.list(&search, 1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, first.file.id);

        // `_` is literal, not a wildcard.
        let underscore = FileFilter {
            search: Some("s_2".into()),
            ..Default::default()
        };
        assert_eq!(registry.list(&underscore, 1, 20).await.unwrap().1, 1);

        let by_type = FileFilter {
            search: Some("text/pl".into()),
            ..Default::default()
        };
        assert_eq!(registry.list(&by_type, 1, 20).await.unwrap().1, 3);

        let dups = FileFilter {
            is_duplicate: Some(true),
            ..Default::default()
        };
        let (found, _) = registry.list(&dups, 1, 20).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, third.file.id);

        let sized = FileFilter {
            min_size: Some(3),
            max_size: Some(5),
            ..Default::default()
        };
        assert_eq!(registry.list(&sized, 1, 20).await.unwrap().1, 2);
    }

    #[tokio::test]
    async fn stats_account_for_shared_content() {
        let vault = TestVault::new().await;
        vault.upload("a.txt", b"hello").await;
        vault.upload("b.txt", b"hello").await;
        vault.upload("c.txt", b"hello").await;
        vault.upload("d.txt", b"0123456789").await;

        let stats = RegistryStore::new(&vault.db).stats().await.unwrap();

        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.total_size, 25);
        assert_eq!(stats.duplicate_count, 2);
        assert_eq!(stats.storage_saved, 10);
        assert_eq!(stats.unique_contents, 2);
        assert_eq!(stats.physical_size, 15);
        assert_eq!(stats.total_size - stats.storage_saved, stats.physical_size);
    }

    #[tokio::test]
    async fn stats_of_empty_registry_are_zero() {
        let vault = TestVault::new().await;

        let stats = RegistryStore::new(&vault.db).stats().await.unwrap();

        assert_eq!(stats, filevault::registry::RegistryStats::default());
    }

    #[tokio::test]
    async fn stats_follow_deletions() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;
        vault.upload("b.txt", b"hello").await;
        vault.lifecycle.delete(a.file.id).await.unwrap();

        let stats = RegistryStore::new(&vault.db).stats().await.unwrap();

        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size, 5);
        assert_eq!(stats.duplicate_count, 0);
        assert_eq!(stats.storage_saved, 0);
        assert_eq!(stats.unique_contents, 1);
        assert_eq!(stats.physical_size, 5);
    }

    #[tokio::test]
    async fn reference_counts_by_fingerprint() {
        let vault = TestVault::new().await;
        let a = vault.upload("a.txt", b"hello").await;
        vault.upload("b.txt", b"hello").await;
        let c = vault.upload("c.txt", b"other").await;

        let counts = RegistryStore::new(&vault.db)
            .reference_counts(&[a.file.fingerprint.clone(), c.file.fingerprint.clone()])
            .await
            .unwrap();

        assert_eq!(counts[&a.file.fingerprint], 2);
        assert_eq!(counts[&c.file.fingerprint], 1);
    }

    #[tokio::test]
    async fn decrement_never_goes_below_zero() {
        let vault = TestVault::new().await;
        vault.upload("a.txt", b"hello").await;
        let registry = RegistryStore::new(&vault.db);

        assert_eq!(registry.decrement_ref_count(HELLO_FINGERPRINT).await.unwrap(), Some(0));
        assert_eq!(registry.decrement_ref_count(HELLO_FINGERPRINT).await.unwrap(), None);
        assert_eq!(registry.increment_ref_count("missing").await.unwrap(), None);
        assert!(registry.remove_content_entry(HELLO_FINGERPRINT).await.unwrap());
    }
}
