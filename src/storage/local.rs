use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::StorageProvider;

/// Local file system storage provider
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Blobs are sharded by the first two characters of their key: `ab/abcdef...`
    fn shard_handle(key: &str) -> Result<String> {
        if key.len() < 3 || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(AppError::Storage(format!("Invalid blob key: {:?}", key)));
        }
        Ok(format!("{}/{}", &key[..2], key))
    }

    fn get_full_path(&self, handle: &str) -> Result<PathBuf> {
        let relative = Path::new(handle);
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return Err(AppError::Storage(format!("Invalid blob handle: {:?}", handle)));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let handle = Self::shard_handle(key)?;
        let full_path = self.get_full_path(&handle)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create blob: {}", e)))?;
        file.write_all(&data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write blob: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to flush blob: {}", e)))?;

        tracing::debug!("Saved blob to {:?}", full_path);
        Ok(handle)
    }

    fn handle_for_key(&self, key: &str) -> Option<String> {
        Self::shard_handle(key).ok()
    }

    async fn get(&self, handle: &str) -> Result<Bytes> {
        let full_path = self.get_full_path(handle)?;

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Blob not found: {}", handle))
            } else {
                AppError::Storage(format!("Failed to read blob: {}", e))
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        let full_path = self.get_full_path(handle)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => tracing::debug!("Deleted blob {:?}", full_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AppError::Storage(format!("Failed to delete blob: {}", e))),
        }

        // Try to remove empty shard directories
        let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current_dir {
            if dir == self.base_path {
                break;
            }
            match fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    if entries.next_entry().await?.is_some() {
                        break; // Not empty
                    }
                    let _ = fs::remove_dir(&dir).await;
                }
                Err(_) => break,
            }
            current_dir = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(())
    }

    async fn exists(&self, handle: &str) -> Result<bool> {
        let full_path = self.get_full_path(handle)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    fn download_url(&self, _handle: &str) -> Option<String> {
        // Served directly by the application
        None
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let key = "0f8fad5b-d9cb-469f-a165-70867728950e";

        let handle = storage.put(key, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(handle, format!("0f/{}", key));
        assert_eq!(storage.handle_for_key(key), Some(handle.clone()));
        assert_eq!(storage.handle_for_key("../x"), None);
        assert!(storage.exists(&handle).await.unwrap());
        assert_eq!(storage.get(&handle).await.unwrap(), Bytes::from_static(b"hello"));

        storage.delete(&handle).await.unwrap();
        assert!(!storage.exists(&handle).await.unwrap());
        // Shard directory is cleaned up with its last blob
        assert!(!dir.path().join("0f").exists());
        // Deleting twice is fine
        storage.delete(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let err = storage.get("ab/abc").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.put("../../etc", Bytes::new()).await.is_err());
        assert!(storage.get("../secret").await.is_err());
        assert!(storage.delete("/etc/passwd").await.is_err());
    }
}
