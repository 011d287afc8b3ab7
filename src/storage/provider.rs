use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Blob storage backend.
///
/// Blobs are addressed by an opaque handle returned from `put`; callers never
/// build storage paths themselves.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store `data` under `key` and return the handle for later access
    async fn put(&self, key: &str, data: Bytes) -> Result<String>;

    /// Handle `put` assigns to `key`, when it can be known without the backend.
    /// Used to clean up writes that were abandoned before returning.
    fn handle_for_key(&self, key: &str) -> Option<String>;

    /// Download data from storage
    async fn get(&self, handle: &str) -> Result<Bytes>;

    /// Delete data from storage. Deleting a missing blob is not an error.
    async fn delete(&self, handle: &str) -> Result<()>;

    /// Check if a blob exists
    async fn exists(&self, handle: &str) -> Result<bool>;

    /// Public URL downloads can be redirected to.
    /// Backends that cannot serve blobs directly return None and the
    /// application proxies the bytes instead.
    fn download_url(&self, handle: &str) -> Option<String>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
