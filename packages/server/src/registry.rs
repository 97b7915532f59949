use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Alias, Func, LikeExpr, LockType, OnConflict};
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{content_entry, logical_file};
use crate::models::shared::escape_like;

/// Outcome of [`RegistryStore::compare_and_register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The fingerprint was unknown. The caller owns the new entry and must
    /// finalize the blob and insert the candidate record.
    New,
    /// The fingerprint was already registered; the new record links to
    /// `original_file_id`.
    Existing { original_file_id: Uuid },
}

/// Fingerprint about to be registered.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub fingerprint: String,
    pub storage_key: String,
    pub byte_size: i64,
    /// Id the uploader's record will get if the content turns out to be new.
    pub candidate_id: Uuid,
}

/// Filters for [`RegistryStore::list`].
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Case-insensitive match on display name or media type.
    pub search: Option<String>,
    /// Case-insensitive substring of the media type.
    pub media_type: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub is_duplicate: Option<bool>,
}

/// Aggregate storage accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_files: u64,
    /// Logical bytes: the sum of every record's size.
    pub total_size: u64,
    /// Bytes not stored thanks to deduplication.
    pub storage_saved: u64,
    pub duplicate_count: u64,
    pub unique_contents: u64,
    /// Bytes actually held by the blob store.
    pub physical_size: u64,
}

/// Logical file records and per-fingerprint content entries.
///
/// Every method runs on the connection it was built with. Per-fingerprint
/// serialization relies on the caller passing an open transaction; the row
/// locks taken by [`compare_and_register`](Self::compare_and_register),
/// [`content_entry_for_update`](Self::content_entry_for_update) and the
/// counter updates are held until that transaction ends.
pub struct RegistryStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> RegistryStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<logical_file::Model>, DbErr> {
        logical_file::Entity::find_by_id(id).one(self.conn).await
    }

    /// Get a logical file by ID with FOR UPDATE lock.
    pub async fn find_for_update(&self, id: Uuid) -> Result<Option<logical_file::Model>, DbErr> {
        logical_file::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(self.conn)
            .await
    }

    /// Canonical record for a fingerprint.
    ///
    /// Resolved through the content entry; falls back to the oldest record
    /// carrying the fingerprint when the entry is missing.
    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<logical_file::Model>, DbErr> {
        if let Some(entry) = self.content_entry(fingerprint).await?
            && let Some(original) = self.find(entry.original_file_id).await?
        {
            return Ok(Some(original));
        }

        logical_file::Entity::find()
            .filter(logical_file::Column::Fingerprint.eq(fingerprint))
            .order_by_asc(logical_file::Column::CreatedAt)
            .order_by_asc(logical_file::Column::Id)
            .one(self.conn)
            .await
    }

    pub async fn content_entry(
        &self,
        fingerprint: &str,
    ) -> Result<Option<content_entry::Model>, DbErr> {
        content_entry::Entity::find_by_id(fingerprint.to_owned())
            .one(self.conn)
            .await
    }

    pub async fn content_entry_for_update(
        &self,
        fingerprint: &str,
    ) -> Result<Option<content_entry::Model>, DbErr> {
        content_entry::Entity::find_by_id(fingerprint.to_owned())
            .lock(LockType::Update)
            .one(self.conn)
            .await
    }

    /// Atomically claim a fingerprint or join the existing claim.
    ///
    /// A single upsert on the entry's primary key: the insert wins for the
    /// first uploader, every other one hits the conflict arm, which only
    /// touches `updated_at` but takes the row lock. The entry is then read
    /// back; it names `candidate_id` as original only if this call created it.
    pub async fn compare_and_register(&self, new: &NewContent) -> Result<Registration, DbErr> {
        let now = Utc::now();
        let entry = content_entry::ActiveModel {
            fingerprint: Set(new.fingerprint.clone()),
            storage_key: Set(new.storage_key.clone()),
            byte_size: Set(new.byte_size),
            reference_count: Set(1),
            original_file_id: Set(new.candidate_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        content_entry::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(content_entry::Column::Fingerprint)
                    .update_column(content_entry::Column::UpdatedAt)
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        let entry = self.content_entry(&new.fingerprint).await?.ok_or_else(|| {
            DbErr::Custom(format!(
                "content entry {} missing after upsert",
                new.fingerprint
            ))
        })?;

        if entry.original_file_id == new.candidate_id {
            Ok(Registration::New)
        } else {
            Ok(Registration::Existing {
                original_file_id: entry.original_file_id,
            })
        }
    }

    /// `reference_count = reference_count + 1`. Returns the new count, or
    /// `None` if the entry does not exist.
    pub async fn increment_ref_count(&self, fingerprint: &str) -> Result<Option<i64>, DbErr> {
        let result = content_entry::Entity::update_many()
            .col_expr(
                content_entry::Column::ReferenceCount,
                Expr::col(content_entry::Column::ReferenceCount).add(1),
            )
            .col_expr(content_entry::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(content_entry::Column::Fingerprint.eq(fingerprint))
            .exec(self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.reference_count(fingerprint).await
    }

    /// `reference_count = reference_count - 1`, never below zero. Returns the
    /// new count, or `None` if the entry does not exist or is already at zero.
    pub async fn decrement_ref_count(&self, fingerprint: &str) -> Result<Option<i64>, DbErr> {
        let result = content_entry::Entity::update_many()
            .col_expr(
                content_entry::Column::ReferenceCount,
                Expr::col(content_entry::Column::ReferenceCount).sub(1),
            )
            .col_expr(content_entry::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(content_entry::Column::Fingerprint.eq(fingerprint))
            .filter(content_entry::Column::ReferenceCount.gt(0))
            .exec(self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.reference_count(fingerprint).await
    }

    async fn reference_count(&self, fingerprint: &str) -> Result<Option<i64>, DbErr> {
        content_entry::Entity::find_by_id(fingerprint.to_owned())
            .select_only()
            .column(content_entry::Column::ReferenceCount)
            .into_tuple()
            .one(self.conn)
            .await
    }

    pub async fn insert(
        &self,
        model: logical_file::ActiveModel,
    ) -> Result<logical_file::Model, DbErr> {
        model.insert(self.conn).await
    }

    /// Delete a logical file row. Returns `false` if it did not exist.
    pub async fn delete(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = logical_file::Entity::delete_by_id(id)
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Remove a content entry whose count reached zero. Entries still
    /// referenced are left alone and `false` is returned.
    pub async fn remove_content_entry(&self, fingerprint: &str) -> Result<bool, DbErr> {
        let result = content_entry::Entity::delete_many()
            .filter(content_entry::Column::Fingerprint.eq(fingerprint))
            .filter(content_entry::Column::ReferenceCount.eq(0))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Promote the oldest surviving record for `fingerprint` to canonical
    /// original and point every other record and the content entry at it.
    ///
    /// Returns the promoted id, or `None` when no record carries the
    /// fingerprint any more.
    pub async fn reassign_original(&self, fingerprint: &str) -> Result<Option<Uuid>, DbErr> {
        let survivor = logical_file::Entity::find()
            .filter(logical_file::Column::Fingerprint.eq(fingerprint))
            .order_by_asc(logical_file::Column::CreatedAt)
            .order_by_asc(logical_file::Column::Id)
            .one(self.conn)
            .await?;

        let Some(survivor) = survivor else {
            return Ok(None);
        };

        logical_file::Entity::update_many()
            .col_expr(logical_file::Column::IsDuplicate, Expr::value(false))
            .col_expr(
                logical_file::Column::OriginalFileId,
                Expr::value(Option::<Uuid>::None),
            )
            .filter(logical_file::Column::Id.eq(survivor.id))
            .exec(self.conn)
            .await?;

        logical_file::Entity::update_many()
            .col_expr(
                logical_file::Column::OriginalFileId,
                Expr::value(Some(survivor.id)),
            )
            .filter(logical_file::Column::Fingerprint.eq(fingerprint))
            .filter(logical_file::Column::Id.ne(survivor.id))
            .exec(self.conn)
            .await?;

        content_entry::Entity::update_many()
            .col_expr(
                content_entry::Column::OriginalFileId,
                Expr::value(survivor.id),
            )
            .col_expr(content_entry::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(content_entry::Column::Fingerprint.eq(fingerprint))
            .exec(self.conn)
            .await?;

        Ok(Some(survivor.id))
    }

    /// Reference counts for a set of fingerprints, keyed by fingerprint.
    pub async fn reference_counts(
        &self,
        fingerprints: &[String],
    ) -> Result<HashMap<String, i64>, DbErr> {
        if fingerprints.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, i64)> = content_entry::Entity::find()
            .select_only()
            .column(content_entry::Column::Fingerprint)
            .column(content_entry::Column::ReferenceCount)
            .filter(content_entry::Column::Fingerprint.is_in(fingerprints.iter().cloned()))
            .into_tuple()
            .all(self.conn)
            .await?;

        Ok(rows.into_iter().collect())
    }

    /// List logical files, newest first.
    pub async fn list(
        &self,
        filter: &FileFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<logical_file::Model>, u64), DbErr> {
        let mut query = logical_file::Entity::find();

        if let Some(search) = &filter.search {
            let term = escape_like(search.trim());
            if !term.is_empty() {
                let pattern = format!("%{}%", term.to_lowercase());
                query = query.filter(
                    Condition::any()
                        .add(
                            Expr::expr(Func::lower(Expr::col(logical_file::Column::DisplayName)))
                                .like(LikeExpr::new(pattern.clone()).escape('\\')),
                        )
                        .add(
                            Expr::expr(Func::lower(Expr::col(logical_file::Column::MediaType)))
                                .like(LikeExpr::new(pattern).escape('\\')),
                        ),
                );
            }
        }

        if let Some(media_type) = &filter.media_type {
            let term = escape_like(media_type.trim());
            if !term.is_empty() {
                query = query.filter(
                    Expr::expr(Func::lower(Expr::col(logical_file::Column::MediaType)))
                        .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
                );
            }
        }

        if let Some(min) = filter.min_size {
            query = query.filter(logical_file::Column::ByteSize.gte(min));
        }
        if let Some(max) = filter.max_size {
            query = query.filter(logical_file::Column::ByteSize.lte(max));
        }
        if let Some(after) = filter.created_after {
            query = query.filter(logical_file::Column::CreatedAt.gte(after));
        }
        if let Some(before) = filter.created_before {
            query = query.filter(logical_file::Column::CreatedAt.lte(before));
        }
        if let Some(is_duplicate) = filter.is_duplicate {
            query = query.filter(logical_file::Column::IsDuplicate.eq(is_duplicate));
        }

        let total = query.clone().count(self.conn).await?;

        let files = query
            .order_by_desc(logical_file::Column::CreatedAt)
            .order_by_desc(logical_file::Column::Id)
            .offset(page.saturating_sub(1) * per_page)
            .limit(per_page)
            .all(self.conn)
            .await?;

        Ok((files, total))
    }

    /// Storage accounting across the whole registry, aggregated in SQL.
    pub async fn stats(&self) -> Result<RegistryStats, DbErr> {
        let (total_files, total_size) = count_and_sum(
            logical_file::Entity::find(),
            logical_file::Column::Id,
            logical_file::Column::ByteSize,
            self.conn,
        )
        .await?;
        let (duplicate_count, storage_saved) = count_and_sum(
            logical_file::Entity::find().filter(logical_file::Column::IsDuplicate.eq(true)),
            logical_file::Column::Id,
            logical_file::Column::ByteSize,
            self.conn,
        )
        .await?;
        let (unique_contents, physical_size) = count_and_sum(
            content_entry::Entity::find(),
            content_entry::Column::Fingerprint,
            content_entry::Column::ByteSize,
            self.conn,
        )
        .await?;

        Ok(RegistryStats {
            total_files,
            total_size,
            storage_saved,
            duplicate_count,
            unique_contents,
            physical_size,
        })
    }
}

/// `COUNT(key)` and `SUM(size)` over `select`. The sum is cast back to
/// `BIGINT` because Postgres widens `SUM(bigint)` to `numeric`.
async fn count_and_sum<E, C>(
    select: Select<E>,
    key: E::Column,
    size: E::Column,
    conn: &C,
) -> Result<(u64, u64), DbErr>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let row: Option<(i64, Option<i64>)> = select
        .select_only()
        .column_as(key.count(), "row_count")
        .column_as(
            Expr::expr(Func::cast_as(size.sum(), Alias::new("BIGINT"))),
            "byte_total",
        )
        .into_tuple()
        .one(conn)
        .await?;

    let (count, bytes) = row.unwrap_or_default();
    Ok((
        Ord::max(count, 0) as u64,
        Ord::max(bytes.unwrap_or(0), 0) as u64,
    ))
}
