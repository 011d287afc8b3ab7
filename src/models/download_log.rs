use serde::Serialize;
use sqlx::FromRow;

/// One successful access to a shared file
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DownloadLogEntry {
    pub id: i64,
    pub file_id: String,
    pub timestamp: String,
    pub source_address: String,
    pub viewer_id: Option<String>,
}
