pub mod local;
pub mod provider;
pub mod remote;

pub use local::*;
pub use provider::*;
pub use remote::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// Build the configured blob store
pub fn provider_from_config(config: &StorageConfig) -> Result<Arc<dyn StorageProvider>> {
    let provider: Arc<dyn StorageProvider> = match config.backend {
        StorageBackend::Local => Arc::new(LocalStorage::new(&config.local_path)),
        StorageBackend::Remote => Arc::new(RemoteStorage::new(
            &config.remote_endpoint,
            config.remote_token.clone(),
            config.remote_public_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?),
    };
    tracing::info!("Using {} blob storage", provider.storage_type());
    Ok(provider)
}
