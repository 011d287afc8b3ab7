use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Render a timestamp in the fixed-width form stored in the database.
///
/// Millisecond precision with a `Z` suffix keeps every stored value the same
/// width, so string comparison in SQL matches chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Uploaded file record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    #[serde(skip_serializing)]
    pub blob_handle: String,
    pub size: i64,
    pub content_type: Option<String>,
    pub upload_time: String,
    pub expiry_time: String,
    pub download_count: i64,
    pub sender_email: Option<String>,
    pub receiver_email: Option<String>,
    pub owner_id: Option<String>,
}

impl FileRecord {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expiry_time)
    }

    /// A record is expired once `now` is strictly past its expiry time.
    /// Unparseable expiry times count as expired so the record stays reclaimable.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => now > expiry,
            None => true,
        }
    }

    /// MIME type to serve the blob with
    pub fn mime_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.filename)
                    .first_or_octet_stream()
                    .to_string()
            })
    }
}

/// Fields needed to create a record; the lifecycle manager fills in the rest
#[derive(Debug, Clone, Default)]
pub struct NewUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub sender_email: Option<String>,
    pub receiver_email: Option<String>,
    pub owner_id: Option<String>,
}

/// Upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_id: String,
    pub download_link: String,
    pub expiry_time: String,
}

/// Public file metadata (never includes the blob)
#[derive(Debug, Serialize)]
pub struct FileInfoResponse {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub upload_time: String,
    pub expiry_time: String,
    pub download_count: i64,
    pub sender_email: Option<String>,
}

impl From<FileRecord> for FileInfoResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            size: record.size,
            upload_time: record.upload_time,
            expiry_time: record.expiry_time,
            download_count: record.download_count,
            sender_email: record.sender_email,
        }
    }
}

/// Item in the owner's file list
#[derive(Debug, Serialize)]
pub struct OwnedFileItem {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub upload_time: String,
    pub expiry_time: String,
    pub download_count: i64,
    pub sender_email: Option<String>,
    pub receiver_email: Option<String>,
    pub download_link: String,
}

impl OwnedFileItem {
    pub fn new(record: FileRecord, download_link: String) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            size: record.size,
            upload_time: record.upload_time,
            expiry_time: record.expiry_time,
            download_count: record.download_count,
            sender_email: record.sender_email,
            receiver_email: record.receiver_email,
            download_link,
        }
    }
}

/// Request to email a share link
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub email: Option<String>,
    pub download_link: Option<String>,
    pub file_name: Option<String>,
    pub expiry_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(expiry_time: &str) -> FileRecord {
        FileRecord {
            id: "id".to_string(),
            filename: "report.pdf".to_string(),
            blob_handle: "id".to_string(),
            size: 3,
            content_type: None,
            upload_time: expiry_time.to_string(),
            expiry_time: expiry_time.to_string(),
            download_count: 0,
            sender_email: None,
            receiver_email: None,
            owner_id: None,
        }
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let fractional = whole + Duration::microseconds(123_456);
        assert_eq!(format_timestamp(whole), "2026-01-02T03:04:05.000Z");
        assert_eq!(format_timestamp(fractional), "2026-01-02T03:04:05.123Z");
        assert!(format_timestamp(whole) < format_timestamp(fractional));
        assert_eq!(parse_timestamp(&format_timestamp(whole)), Some(whole));
    }

    #[test]
    fn test_expiry_boundary() {
        let expiry = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let rec = record(&format_timestamp(expiry));
        assert!(!rec.is_expired_at(expiry));
        assert!(rec.is_expired_at(expiry + Duration::milliseconds(1)));
        assert!(record("garbage").is_expired_at(expiry));
    }

    #[test]
    fn test_mime_type_fallback() {
        let mut rec = record("2026-01-02T00:00:00.000Z");
        assert_eq!(rec.mime_type(), "application/pdf");
        rec.content_type = Some("text/plain".to_string());
        assert_eq!(rec.mime_type(), "text/plain");
        rec.filename = "noext".to_string();
        rec.content_type = None;
        assert_eq!(rec.mime_type(), "application/octet-stream");
    }
}
