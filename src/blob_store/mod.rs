/// Blob Storage System
///
/// Stores uploaded media as flat files under a storage root. The stored
/// filename encodes the blob id and original filename; there is no
/// separate metadata index.

pub mod disk;
pub mod models;

pub use disk::DiskBlobStore;
pub use models::*;

use crate::{config::StorageConfig, error::MediaResult};
use async_trait::async_trait;
use std::path::PathBuf;

/// Blob storage backend trait
///
/// Every call stands alone: implementations hold no in-memory index or
/// lock, so handlers may call them concurrently.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store non-empty content under a fresh id
    async fn upload(&self, data: Vec<u8>, original_filename: &str) -> MediaResult<UploadedBlob>;

    /// List every stored blob, in no particular order
    async fn list(&self) -> MediaResult<Vec<BlobEntry>>;

    /// Open a blob by id
    async fn get(&self, id: &str) -> MediaResult<Option<BlobContent>>;

    /// Delete a blob by id, returning false if nothing matched
    async fn delete(&self, id: &str) -> MediaResult<bool>;

    /// Check that the backend can accept writes
    async fn health_check(&self) -> MediaResult<()>;
}

/// Configuration for blob storage
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// Directory holding the stored files
    pub root: PathBuf,

    /// Staging directory for uploads before they are renamed into place
    pub tmp_location: PathBuf,
}

impl From<&StorageConfig> for BlobStoreConfig {
    fn from(storage: &StorageConfig) -> Self {
        Self {
            root: storage.root.clone(),
            tmp_location: storage.tmp_location.clone(),
        }
    }
}
