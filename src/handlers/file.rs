use axum::{
    body::Body,
    extract::{ConnectInfo, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::net::SocketAddr;

use crate::config::non_empty;
use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::auth::{MaybeUser, RequireUser};
use crate::models::{
    DownloadLogEntry, FileInfoResponse, FileRecord, NewUpload, OwnedFileItem, UploadResponse,
};
use crate::services::{mailer, BlobContent, OwnedDeletion, Resolution};
use crate::AppState;

const NOT_FOUND_OR_UNAUTHORIZED: &str = "File not found or unauthorized";

fn live(resolution: Resolution) -> Result<FileRecord> {
    match resolution {
        Resolution::Live(record) => Ok(record),
        Resolution::Expired => Err(AppError::Gone("File link expired".to_string())),
        Resolution::NotFound => Err(AppError::NotFound("File not found".to_string())),
    }
}

/// Client address for the download log: first `X-Forwarded-For` hop, then the peer
fn source_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Upload a file
/// POST /api/file/upload
pub async fn upload_file(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut payload: Option<Bytes> = None;
    let mut upload = NewUpload {
        owner_id: user.map(|u| u.id),
        ..Default::default()
    };

    // Process multipart fields
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(format!("Failed to process multipart: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            // A plain form value named `file` is not an upload
            "file" => {
                let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
                    continue;
                };
                upload.filename = if file_name.is_empty() {
                    "untitled".to_string()
                } else {
                    file_name
                };
                upload.content_type = field.content_type().map(|s| s.to_string());
                payload = Some(field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read file: {}", e))
                })?);
            }
            "sender_email" => {
                upload.sender_email = non_empty(&field.text().await.unwrap_or_default());
            }
            "receiver_email" => {
                upload.receiver_email = non_empty(&field.text().await.unwrap_or_default());
            }
            _ => {}
        }
    }

    let payload = payload
        .filter(|data| !data.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    let record = state.lifecycle.create(payload, upload).await?;
    let download_link = state.config.download_link(&record.id);

    // Notification is a side effect: failures never fail the upload
    if let Some(receiver) = &record.receiver_email {
        let message =
            mailer::upload_notification(receiver, &download_link, state.config.retention.hours);
        if let Err(e) = state.mailer.send(&message).await {
            tracing::warn!("Failed to notify {} about file {}: {}", receiver, record.id, e);
        }
    }

    let body = UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_id: record.id,
        download_link,
        expiry_time: record.expiry_time,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(body))).into_response())
}

/// Get public metadata for a file
/// GET /api/file/info/:id
pub async fn get_file_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FileInfoResponse>>> {
    let record = live(state.lifecycle.resolve(&id).await?)?;
    Ok(Json(ApiResponse::success(FileInfoResponse::from(record))))
}

/// Download a file, counting the access
/// GET /api/file/download/:id
pub async fn download_file(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response> {
    let source = source_address(&headers, peer.map(|ConnectInfo(addr)| addr));
    let viewer = user.map(|u| u.id);
    let record = live(
        state
            .lifecycle
            .record_access(&id, &source, viewer.as_deref())
            .await?,
    )?;
    serve(&state, record).await
}

/// Download a file without counting it
/// GET /api/file/download/:id/raw
pub async fn download_file_raw(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let record = live(state.lifecycle.resolve(&id).await?)?;
    serve(&state, record).await
}

async fn serve(state: &AppState, record: FileRecord) -> Result<Response> {
    let data = match state.lifecycle.open(&record).await? {
        BlobContent::Redirect(url) => {
            return Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response());
        }
        BlobContent::Bytes(data) => data,
    };

    let fallback_name = record.filename.replace(['"', '\\', '\r', '\n'], "_");
    let encoded_name = urlencoding::encode(&record.filename);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, record.mime_type())
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                fallback_name, encoded_name
            ),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// List the caller's live uploads, newest first
/// GET /api/file/my-files
pub async fn list_my_files(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<ApiResponse<Vec<OwnedFileItem>>>> {
    let records = state.lifecycle.list_owned(&user.id).await?;
    let items = records
        .into_iter()
        .map(|record| {
            let link = state.config.download_link(&record.id);
            OwnedFileItem::new(record, link)
        })
        .collect();
    Ok(Json(ApiResponse::success(items)))
}

/// Download history of one of the caller's uploads
/// GET /api/file/:id/downloads
pub async fn list_downloads(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<DownloadLogEntry>>>> {
    let owned = match state.lifecycle.resolve(&id).await? {
        Resolution::Live(record) => record.owner_id.as_deref() == Some(user.id.as_str()),
        _ => false,
    };
    if !owned {
        return Err(AppError::NotFound(NOT_FOUND_OR_UNAUTHORIZED.to_string()));
    }

    let entries = state.lifecycle.download_logs(&id).await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// Delete one of the caller's uploads
/// DELETE /api/file/:id
pub async fn delete_file(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    match state.lifecycle.delete_owned(&id, &user.id).await? {
        OwnedDeletion::Reclaimed => Ok(Json(ApiResponse::<()>::success_message(
            "File deleted successfully",
        ))),
        OwnedDeletion::NotFound | OwnedDeletion::Forbidden => {
            Err(AppError::NotFound(NOT_FOUND_OR_UNAUTHORIZED.to_string()))
        }
    }
}
