/// Application context handed to every handler
use crate::{
    blob_store::{BlobBackend, BlobStoreConfig, DiskBlobStore},
    config::ServerConfig,
    error::MediaResult,
};
use std::sync::Arc;

/// Shared services; cloning is cheap
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub blob_store: Arc<dyn BlobBackend>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> MediaResult<Self> {
        // Validate configuration
        config.validate()?;

        // Storage root is created here; failure stops startup
        let blob_store = DiskBlobStore::open(BlobStoreConfig::from(&config.storage)).await?;
        tracing::info!(root = ?blob_store.root(), "blob store ready");

        Ok(Self::with_store(config, Arc::new(blob_store)))
    }

    /// Assemble a context around an already opened store
    pub fn with_store(config: ServerConfig, blob_store: Arc<dyn BlobBackend>) -> Self {
        Self {
            config: Arc::new(config),
            blob_store,
        }
    }

    /// Base URL for blob links
    pub fn public_url(&self) -> &str {
        &self.config.service.public_url
    }
}
