use std::io;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, body::Body};
use common::storage::{Fingerprint, StorageKey};
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::instrument;
use uuid::Uuid;

use crate::dedup::UploadMeta;
use crate::entity::logical_file;
use crate::error::{AppError, ErrorBody};
use crate::models::file::{FileListQuery, FileListResponse, FileResponse, StatsResponse};
use crate::models::shared::Pagination;
use crate::registry::RegistryStore;
use crate::state::AppState;
use crate::utils::display_name::normalize_display_name;
use crate::utils::media_type::resolve_media_type;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn upload_body_limit(max_blob_size: u64) -> DefaultBodyLimit {
    let limit = max_blob_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Files",
    operation_id = "uploadFile",
    summary = "Upload a file",
    description = "Stores the `file` multipart field. Content already held by the vault is not \
        stored again: the new file is recorded as a duplicate linked to the canonical file with \
        the same fingerprint. Both fresh and duplicate uploads create a new file record.",
    request_body(content_type = "multipart/form-data", description = "File upload"),
    responses(
        (status = 201, description = "File recorded", body = FileResponse),
        (status = 400, description = "Validation error or broken upload stream (VALIDATION_ERROR)", body = ErrorBody),
        (status = 413, description = "File too large (PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 503, description = "Storage unavailable (STORAGE_UNAVAILABLE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let raw_name = field
            .file_name()
            .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
        let display_name =
            normalize_display_name(raw_name).map_err(|e| AppError::Validation(e.message().into()))?;
        let media_type = resolve_media_type(field.content_type(), &display_name);

        let reader = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
        let ingested = state
            .dedup
            .ingest(
                reader,
                UploadMeta {
                    display_name,
                    media_type,
                },
            )
            .await?;

        return Ok((StatusCode::CREATED, Json(FileResponse::from(ingested))));
    }

    Err(AppError::Validation("Missing 'file' field".into()))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Files",
    operation_id = "listFiles",
    summary = "List files",
    description = "Returns files newest first. `search` matches display name or media type \
        case-insensitively; the other parameters narrow by media type, size, upload date and \
        duplicate status.",
    params(FileListQuery),
    responses(
        (status = 200, description = "File list", body = FileListResponse),
        (status = 400, description = "Invalid filter (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FileListQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    let filter = query.to_filter()?;
    let page = query.page();
    let per_page = query.per_page();

    let registry = RegistryStore::new(&state.db);
    let (files, total) = registry.list(&filter, page, per_page).await?;

    let fingerprints: Vec<String> = files.iter().map(|f| f.fingerprint.clone()).collect();
    let counts = registry.reference_counts(&fingerprints).await?;

    let data = files
        .into_iter()
        .map(|file| {
            let count = counts.get(&file.fingerprint).copied().unwrap_or(0);
            FileResponse::new(file, count)
        })
        .collect();

    Ok(Json(FileListResponse {
        data,
        pagination: Pagination::new(page, per_page, total),
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Files",
    operation_id = "getFile",
    summary = "Get file metadata",
    params(("id" = String, Path, description = "File ID (UUID)")),
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let file = find_file(&state, &id).await?;
    Ok(Json(with_reference_count(&state, file).await?))
}

#[utoipa::path(
    get,
    path = "/{id}/content",
    tag = "Files",
    operation_id = "downloadFile",
    summary = "Download file content",
    description = "Streams the file bytes. The ETag is the content fingerprint, so \
        `If-None-Match` answers 304 for any file with identical content.",
    params(("id" = String, Path, description = "File ID (UUID)")),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 503, description = "Storage unavailable (STORAGE_UNAVAILABLE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let file = find_file(&state, &id).await?;

    let etag_value = format!("\"{}\"", file.fingerprint);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let entry = RegistryStore::new(&state.db)
        .content_entry(&file.fingerprint)
        .await?
        .ok_or_else(|| AppError::NotFound("File content not found".into()))?;
    let key = StorageKey::parse(&entry.storage_key)?;
    let reader = state.blob_store.get_stream(&key).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &file.media_type)
        .header(header::CONTENT_LENGTH, file.byte_size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&file.display_name),
        )
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Files",
    operation_id = "deleteFile",
    summary = "Delete a file",
    description = "Removes the file record. The stored content is deleted together with the \
        last file referencing it.",
    params(("id" = String, Path, description = "File ID (UUID)")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 400, description = "Invalid ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 503, description = "Storage unavailable (STORAGE_UNAVAILABLE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_file_id(&id)?;
    state.lifecycle.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/stats",
    tag = "Files",
    operation_id = "fileStats",
    summary = "Storage statistics",
    responses(
        (status = 200, description = "Storage accounting", body = StatsResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn file_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = RegistryStore::new(&state.db).stats().await?;
    Ok(Json(stats.into()))
}

#[utoipa::path(
    get,
    path = "/fingerprint/{hash}",
    tag = "Files",
    operation_id = "getFileByFingerprint",
    summary = "Find the canonical file for a fingerprint",
    description = "Lets a client check whether content is already stored before uploading it.",
    params(("hash" = String, Path, description = "Hex SHA-256 of the content")),
    responses(
        (status = 200, description = "Canonical file", body = FileResponse),
        (status = 400, description = "Malformed fingerprint (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "No file has this content (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn file_by_fingerprint(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let fingerprint =
        Fingerprint::from_hex(hash.trim()).map_err(|e| AppError::Validation(e.to_string()))?;

    let file = RegistryStore::new(&state.db)
        .find_by_fingerprint(&fingerprint.to_hex())
        .await?
        .ok_or_else(|| AppError::NotFound("No file with this fingerprint".into()))?;

    Ok(Json(with_reference_count(&state, file).await?))
}

fn parse_file_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::Validation("Invalid file ID".into()))
}

async fn find_file(state: &AppState, id: &str) -> Result<logical_file::Model, AppError> {
    let id = parse_file_id(id)?;
    RegistryStore::new(&state.db)
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))
}

async fn with_reference_count(
    state: &AppState,
    file: logical_file::Model,
) -> Result<FileResponse, AppError> {
    let count = RegistryStore::new(&state.db)
        .content_entry(&file.fingerprint)
        .await?
        .map(|entry| entry.reference_count)
        .unwrap_or(0);
    Ok(FileResponse::new(file, count))
}

/// Build a safe `Content-Disposition` header value.
fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    // RFC 5987 percent-encoding for filename*.
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'&' | b'+' | b'-'
            | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => String::from(b as char),
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("attachment; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
