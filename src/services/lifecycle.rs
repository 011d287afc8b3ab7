//! Lifecycle of uploaded files.
//!
//! A record moves `Created -> Live -> Expired -> Reclaimed`. Live and Expired
//! are never stored: they are derived on every read by comparing the clock
//! with `expiry_time`. Reclamation removes the blob, the download log and the
//! record itself, leaving no tombstone.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use bytes::Bytes;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{format_timestamp, DownloadLogEntry, FileRecord, NewUpload};
use crate::services::Clock;
use crate::storage::StorageProvider;

/// Outcome of looking a record up
#[derive(Debug)]
pub enum Resolution {
    Live(FileRecord),
    Expired,
    NotFound,
}

/// Outcome of reclaiming a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclamation {
    Reclaimed,
    NotFound,
}

/// Outcome of an owner-initiated delete.
/// Callers must present `NotFound` and `Forbidden` identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedDeletion {
    Reclaimed,
    NotFound,
    Forbidden,
}

/// How a blob should be delivered to a client
#[derive(Debug)]
pub enum BlobContent {
    Bytes(Bytes),
    Redirect(String),
}

pub struct LifecycleManager {
    db: Database,
    storage: Arc<dyn StorageProvider>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    storage_timeout: StdDuration,
}

impl LifecycleManager {
    pub fn new(
        db: Database,
        storage: Arc<dyn StorageProvider>,
        clock: Arc<dyn Clock>,
        retention: Duration,
    ) -> Self {
        Self {
            db,
            storage,
            clock,
            retention,
            storage_timeout: StdDuration::from_secs(60),
        }
    }

    /// Bound on a single blob write during upload
    pub fn with_storage_timeout(mut self, timeout: StdDuration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn storage_type(&self) -> &'static str {
        self.storage.storage_type()
    }

    /// Current time at the precision timestamps are stored with
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    /// Store a new upload and persist its record.
    ///
    /// The blob is written before the record; if the record cannot be
    /// persisted the blob is removed again on a best-effort basis.
    pub async fn create(&self, payload: Bytes, upload: NewUpload) -> Result<FileRecord> {
        let id = Uuid::new_v4().to_string();
        let size = payload.len() as i64;

        let blob_handle =
            match tokio::time::timeout(self.storage_timeout, self.storage.put(&id, payload)).await {
                Ok(Ok(handle)) => handle,
                Ok(Err(e)) => return Err(storage_failure(e)),
                Err(_) => {
                    // The abandoned write may have left part of the blob behind
                    if let Some(handle) = self.storage.handle_for_key(&id) {
                        self.discard_blob(&id, &handle).await;
                    }
                    return Err(AppError::Storage(format!(
                        "Blob write timed out after {:?}",
                        self.storage_timeout
                    )));
                }
            };

        let now = self.now();
        let record = FileRecord {
            id: id.clone(),
            filename: upload.filename,
            blob_handle,
            size,
            content_type: upload.content_type,
            upload_time: format_timestamp(now),
            expiry_time: format_timestamp(now + self.retention),
            download_count: 0,
            sender_email: upload.sender_email,
            receiver_email: upload.receiver_email,
            owner_id: upload.owner_id,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO files (id, filename, blob_handle, size, content_type, upload_time, expiry_time, download_count, sender_email, receiver_email, owner_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(&record.blob_handle)
        .bind(record.size)
        .bind(&record.content_type)
        .bind(&record.upload_time)
        .bind(&record.expiry_time)
        .bind(&record.sender_email)
        .bind(&record.receiver_email)
        .bind(&record.owner_id)
        .execute(self.db.pool())
        .await;

        if let Err(e) = inserted {
            self.discard_blob(&record.id, &record.blob_handle).await;
            return Err(e.into());
        }

        tracing::info!(
            "Stored file {} ({} bytes), expires at {}",
            record.id,
            record.size,
            record.expiry_time
        );
        Ok(record)
    }

    async fn find(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(record)
    }

    /// Look a record up, applying lazy expiry.
    ///
    /// An expired record is reclaimed before `Expired` is returned, so the
    /// next lookup for the same id sees `NotFound`.
    pub async fn resolve(&self, id: &str) -> Result<Resolution> {
        let Some(record) = self.find(id).await? else {
            return Ok(Resolution::NotFound);
        };

        if record.is_expired_at(self.now()) {
            tracing::info!("File {} expired at {}, reclaiming", id, record.expiry_time);
            if let Err(e) = self.reclaim(id).await {
                // The record still reads as expired; the reaper retries later
                tracing::error!("Failed to reclaim expired file {}: {}", id, e);
            }
            return Ok(Resolution::Expired);
        }

        Ok(Resolution::Live(record))
    }

    /// Count a successful access and append it to the download log.
    ///
    /// The counter is bumped with a single `UPDATE` so concurrent accesses
    /// never lose an increment, and it lands before the log entry.
    pub async fn record_access(
        &self,
        id: &str,
        source_address: &str,
        viewer_id: Option<&str>,
    ) -> Result<Resolution> {
        match self.resolve(id).await? {
            Resolution::Live(_) => {}
            other => return Ok(other),
        }
        self.count_access(id, source_address, viewer_id).await
    }

    /// Increment and log an access to a record already seen as live.
    /// A reclaim landing in between either step yields `NotFound`.
    async fn count_access(
        &self,
        id: &str,
        source_address: &str,
        viewer_id: Option<&str>,
    ) -> Result<Resolution> {
        let updated: Option<FileRecord> = sqlx::query_as(
            "UPDATE files SET download_count = download_count + 1 WHERE id = ? RETURNING *",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(record) = updated else {
            return Ok(Resolution::NotFound);
        };

        if !self.append_log(id, source_address, viewer_id).await? {
            return Ok(Resolution::NotFound);
        }

        tracing::debug!(
            "File {} accessed from {} (count {})",
            id,
            source_address,
            record.download_count
        );
        Ok(Resolution::Live(record))
    }

    /// Returns false when the record no longer exists
    async fn append_log(
        &self,
        id: &str,
        source_address: &str,
        viewer_id: Option<&str>,
    ) -> Result<bool> {
        let logged = sqlx::query(
            "INSERT INTO download_logs (file_id, timestamp, source_address, viewer_id) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format_timestamp(self.now()))
        .bind(source_address)
        .bind(viewer_id)
        .execute(self.db.pool())
        .await;

        match logged {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the blob, the download log and the record.
    ///
    /// Blob deletion is best-effort: a failure is logged and the metadata is
    /// removed regardless. Reclaiming a missing id returns `NotFound`.
    pub async fn reclaim(&self, id: &str) -> Result<Reclamation> {
        let Some(record) = self.find(id).await? else {
            return Ok(Reclamation::NotFound);
        };

        self.discard_blob(id, &record.blob_handle).await;

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM download_logs WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            // A concurrent reclaim got there first
            return Ok(Reclamation::NotFound);
        }

        tracing::info!("Reclaimed file {}", id);
        Ok(Reclamation::Reclaimed)
    }

    /// Delete a record on behalf of its owner
    pub async fn delete_owned(&self, id: &str, requester_id: &str) -> Result<OwnedDeletion> {
        let Some(record) = self.find(id).await? else {
            return Ok(OwnedDeletion::NotFound);
        };

        if record.owner_id.as_deref() != Some(requester_id) {
            tracing::debug!("Account {} may not delete file {}", requester_id, id);
            return Ok(OwnedDeletion::Forbidden);
        }

        let expired = record.is_expired_at(self.now());
        let outcome = self.reclaim(id).await?;
        Ok(match outcome {
            // Already past retention, so it no longer existed as far as callers can tell
            Reclamation::Reclaimed if expired => OwnedDeletion::NotFound,
            Reclamation::Reclaimed => OwnedDeletion::Reclaimed,
            Reclamation::NotFound => OwnedDeletion::NotFound,
        })
    }

    /// Live records owned by `requester_id`, newest first.
    /// Expired records are left out even before the reaper removes them.
    pub async fn list_owned(&self, requester_id: &str) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as(
            "SELECT * FROM files WHERE owner_id = ? AND expiry_time >= ? ORDER BY upload_time DESC, rowid DESC",
        )
        .bind(requester_id)
        .bind(format_timestamp(self.now()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Download history of a record, oldest first
    pub async fn download_logs(&self, id: &str) -> Result<Vec<DownloadLogEntry>> {
        let entries = sqlx::query_as("SELECT * FROM download_logs WHERE file_id = ? ORDER BY id ASC")
            .bind(id)
            .fetch_all(self.db.pool())
            .await?;
        Ok(entries)
    }

    /// Ids of every record past its expiry time
    pub async fn expired_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT id FROM files WHERE expiry_time < ? ORDER BY expiry_time ASC")
            .bind(format_timestamp(self.now()))
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }

    /// Fetch a live record's blob, or a URL to redirect to
    pub async fn open(&self, record: &FileRecord) -> Result<BlobContent> {
        if let Some(url) = self.storage.download_url(&record.blob_handle) {
            return Ok(BlobContent::Redirect(url));
        }
        let data = self.storage.get(&record.blob_handle).await?;
        Ok(BlobContent::Bytes(data))
    }

    async fn discard_blob(&self, id: &str, handle: &str) {
        if let Err(e) = self.storage.delete(handle).await {
            tracing::warn!(
                file_id = %id,
                blob_handle = %handle,
                error = %e,
                "Failed to delete blob, continuing without it"
            );
        }
    }
}

fn storage_failure(e: AppError) -> AppError {
    match e {
        AppError::Storage(_) => e,
        other => AppError::Storage(other.to_string()),
    }
}
