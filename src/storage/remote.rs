use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, StatusCode};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::storage::StorageProvider;

/// HTTP object store provider.
///
/// Objects live at `{endpoint}/{key}` and are written with `PUT`, read with
/// `GET` and removed with `DELETE`. When a public URL is configured, downloads
/// redirect there instead of being proxied.
pub struct RemoteStorage {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    public_url: Option<String>,
}

impl RemoteStorage {
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        public_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            public_url: public_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    fn object_url(&self, handle: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint,
            urlencoding::encode(handle.trim_start_matches('/'))
        )
    }

    fn request(&self, method: reqwest::Method, handle: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.object_url(handle));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl StorageProvider for RemoteStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let resp = self
            .request(reqwest::Method::PUT, key)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, data.len())
            .body(data)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Remote upload failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AppError::Storage(format!(
                "Remote upload failed with status {}",
                resp.status()
            )));
        }

        tracing::info!("Uploaded blob to remote store: {}", key);
        Ok(key.to_string())
    }

    fn handle_for_key(&self, key: &str) -> Option<String> {
        Some(key.to_string())
    }

    async fn get(&self, handle: &str) -> Result<Bytes> {
        let resp = self
            .request(reqwest::Method::GET, handle)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Remote download failed: {}", e)))?;

        match resp.status() {
            status if status.is_success() => Ok(resp.bytes().await?),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("Blob not found: {}", handle))),
            status => Err(AppError::Storage(format!(
                "Remote download failed with status {}",
                status
            ))),
        }
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, handle)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Remote delete failed: {}", e)))?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::debug!("Deleted remote blob {}", handle);
            Ok(())
        } else {
            Err(AppError::Storage(format!(
                "Remote delete failed with status {}",
                status
            )))
        }
    }

    async fn exists(&self, handle: &str) -> Result<bool> {
        let resp = self
            .request(reqwest::Method::HEAD, handle)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Remote lookup failed: {}", e)))?;
        Ok(resp.status().is_success())
    }

    fn download_url(&self, handle: &str) -> Option<String> {
        self.public_url.as_ref().map(|base| {
            format!(
                "{}/{}",
                base,
                urlencoding::encode(handle.trim_start_matches('/'))
            )
        })
    }

    fn storage_type(&self) -> &'static str {
        "remote"
    }
}
