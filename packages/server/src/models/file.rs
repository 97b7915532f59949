use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::Ingested;
use crate::entity::logical_file;
use crate::error::AppError;
use crate::registry::{FileFilter, RegistryStats};

use super::shared::Pagination;

/// A stored file as seen by clients.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FileResponse {
    /// File ID (UUIDv7).
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub id: String,
    /// Name given by the uploader.
    #[schema(example = "report.pdf")]
    pub display_name: String,
    #[schema(example = "application/pdf")]
    pub media_type: String,
    /// Size in bytes.
    #[schema(example = 142857)]
    pub byte_size: i64,
    /// Lowercase hex SHA-256 of the content.
    #[schema(example = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")]
    pub fingerprint: String,
    /// Content was already stored when this file was uploaded.
    pub is_duplicate: bool,
    /// Canonical file holding the same content; null on the canonical file.
    pub original_file_id: Option<String>,
    /// Number of files sharing this content.
    #[schema(example = 2)]
    pub reference_count: i64,
    /// Bytes saved by storing this file as a reference.
    #[schema(example = 0)]
    pub storage_saved: i64,
    pub created_at: DateTime<Utc>,
}

impl FileResponse {
    pub fn new(model: logical_file::Model, reference_count: i64) -> Self {
        let storage_saved = if model.is_duplicate { model.byte_size } else { 0 };
        Self {
            id: model.id.to_string(),
            display_name: model.display_name,
            media_type: model.media_type,
            byte_size: model.byte_size,
            fingerprint: model.fingerprint,
            is_duplicate: model.is_duplicate,
            original_file_id: model.original_file_id.map(|id| id.to_string()),
            reference_count,
            storage_saved,
            created_at: model.created_at,
        }
    }
}

impl From<Ingested> for FileResponse {
    fn from(ingested: Ingested) -> Self {
        Self::new(ingested.file, ingested.reference_count)
    }
}

/// Query parameters for file listing.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct FileListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Case-insensitive match on display name or media type.
    #[param(example = "report")]
    pub search: Option<String>,
    /// Case-insensitive substring of the media type.
    #[param(example = "image/")]
    pub file_type: Option<String>,
    /// Minimum size in bytes (inclusive).
    pub min_size: Option<i64>,
    /// Maximum size in bytes (inclusive).
    pub max_size: Option<i64>,
    /// Earliest upload time (inclusive): RFC 3339 or `YYYY-MM-DD`.
    #[param(example = "2024-01-01")]
    pub start_date: Option<String>,
    /// Latest upload time (inclusive): RFC 3339 or `YYYY-MM-DD` (whole day).
    #[param(example = "2024-12-31")]
    pub end_date: Option<String>,
    /// Only duplicates (`true`) or only canonical files (`false`).
    pub is_duplicate: Option<bool>,
}

impl FileListQuery {
    pub fn page(&self) -> u64 {
        Ord::max(self.page.unwrap_or(1), 1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    /// Validate the filter parameters.
    pub fn to_filter(&self) -> Result<FileFilter, AppError> {
        for (name, size) in [("min_size", self.min_size), ("max_size", self.max_size)] {
            if let Some(size) = size
                && size < 0
            {
                return Err(AppError::Validation(format!("{name} must be >= 0")));
            }
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(AppError::Validation(
                "min_size must not exceed max_size".into(),
            ));
        }

        let created_after = self
            .start_date
            .as_deref()
            .map(|s| parse_date_bound(s, "start_date", NaiveTime::MIN))
            .transpose()?;
        let end_of_day = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
            .ok_or_else(|| AppError::Internal("invalid end-of-day time".into()))?;
        let created_before = self
            .end_date
            .as_deref()
            .map(|s| parse_date_bound(s, "end_date", end_of_day))
            .transpose()?;
        if let (Some(after), Some(before)) = (created_after, created_before)
            && after > before
        {
            return Err(AppError::Validation(
                "start_date must not be after end_date".into(),
            ));
        }

        Ok(FileFilter {
            search: self.search.clone(),
            media_type: self.file_type.clone(),
            min_size: self.min_size,
            max_size: self.max_size,
            created_after,
            created_before,
            is_duplicate: self.is_duplicate,
        })
    }
}

/// Parse an RFC 3339 timestamp, or a bare date completed with `time`.
fn parse_date_bound(s: &str, name: &str, time: NaiveTime) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|date| date.and_time(time).and_utc())
        .map_err(|_| {
            AppError::Validation(format!(
                "{name} must be an RFC 3339 timestamp or YYYY-MM-DD date"
            ))
        })
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FileListResponse {
    pub data: Vec<FileResponse>,
    pub pagination: Pagination,
}

/// Storage accounting across all files.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    #[schema(example = 12)]
    pub total_files: u64,
    /// Sum of all file sizes, counting duplicates.
    #[schema(example = 1048576)]
    pub total_size: u64,
    /// Bytes not stored thanks to deduplication.
    #[schema(example = 524288)]
    pub storage_saved: u64,
    #[schema(example = 4)]
    pub duplicate_count: u64,
    /// Number of distinct contents stored.
    #[schema(example = 8)]
    pub unique_contents: u64,
    /// Bytes held by the blob store.
    #[schema(example = 524288)]
    pub physical_size: u64,
}

impl From<RegistryStats> for StatsResponse {
    fn from(stats: RegistryStats) -> Self {
        Self {
            total_files: stats.total_files,
            total_size: stats.total_size,
            storage_saved: stats.storage_saved,
            duplicate_count: stats.duplicate_count,
            unique_contents: stats.unique_contents,
            physical_size: stats.physical_size,
        }
    }
}
