/// Disk-based blob storage backend
use crate::{
    blob_store::{
        is_lookup_id, sanitize_filename, BlobBackend, BlobContent, BlobEntry, BlobId,
        BlobStoreConfig, StoredName, UploadedBlob,
    },
    error::{MediaError, MediaResult},
    metrics,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, DirEntry, OpenOptions},
    io::AsyncWriteExt,
};

/// Disk storage backend
///
/// Keeps every blob as `{root}/{id}__{original name}`. Lookups scan the
/// root directory for the id prefix. Uploads are staged in a separate
/// directory and renamed into place so readers never see partial files.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
    tmp_location: PathBuf,
}

impl DiskBlobStore {
    /// Open the store, creating the storage root if needed.
    ///
    /// Fails with `MediaError::Startup` when the root exists but is not a
    /// directory, when it cannot be created, or when the staging directory
    /// sits on a different filesystem.
    pub async fn open(config: BlobStoreConfig) -> MediaResult<Self> {
        let BlobStoreConfig { root, tmp_location } = config;

        match fs::metadata(&root).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(MediaError::Startup(format!(
                    "Storage root {:?} exists but is not a directory",
                    root
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MediaError::Startup(format!(
                    "Cannot inspect storage root {:?}: {}",
                    root, e
                )));
            }
        }

        for dir in [&root, &tmp_location] {
            fs::create_dir_all(dir).await.map_err(|e| {
                MediaError::Startup(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        // Staged uploads are renamed into the root, which only works within one filesystem
        if !same_filesystem(&root, &tmp_location).await.map_err(|e| {
            MediaError::Startup(format!("Cannot inspect storage directories: {}", e))
        })? {
            return Err(MediaError::Startup(format!(
                "Staging directory {:?} is not on the same filesystem as storage root {:?}",
                tmp_location, root
            )));
        }

        Ok(Self { root, tmp_location })
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure both directories exist; the root may have been removed
    /// from under a running process.
    async fn ensure_dirs(&self) -> MediaResult<()> {
        for dir in [&self.root, &self.tmp_location] {
            fs::create_dir_all(dir).await.map_err(|e| {
                MediaError::Storage(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Write `data` to a new staging file and flush it to disk
    async fn write_staged(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Scan the root for the first regular file whose name starts with `id__`
    async fn find(&self, id: &str) -> MediaResult<Option<(PathBuf, StoredName)>> {
        if !is_lookup_id(id) {
            return Ok(None);
        }

        let prefix = StoredName::lookup_prefix(id);
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MediaError::Storage(format!(
                    "Failed to read storage root: {}",
                    e
                )))
            }
        };

        while let Some(entry) = next_entry(&mut entries).await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(&prefix) && is_regular_file(&entry).await {
                return Ok(Some((entry.path(), StoredName::parse(&name))));
            }
        }

        Ok(None)
    }

    /// Stage `data`, then rename it to `final_path`. On failure the staged
    /// file is removed so nothing partial is left behind.
    async fn commit(
        &self,
        id: BlobId,
        data: &[u8],
        staging_path: &Path,
        final_path: &Path,
    ) -> MediaResult<()> {
        let result = async {
            self.ensure_dirs().await?;
            Self::write_staged(staging_path, data).await.map_err(|e| {
                MediaError::Storage(format!("Failed to write blob {}: {}", id, e))
            })?;
            fs::rename(staging_path, final_path).await.map_err(|e| {
                MediaError::Storage(format!("Failed to commit blob {}: {}", id, e))
            })
        }
        .await;

        if result.is_err() {
            if let Err(cleanup) = fs::remove_file(staging_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::warn!(id = %id, error = %cleanup, "failed to remove staged upload");
                }
            }
        }

        result
    }

    /// Open a file matched by a scan.
    ///
    /// A file deleted between the scan and the open is not-found, not a
    /// storage error.
    async fn open_matched(
        &self,
        path: &Path,
        stored: StoredName,
    ) -> MediaResult<Option<BlobContent>> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(id = %stored.id, "blob vanished before it could be opened");
                return Ok(None);
            }
            Err(e) => {
                return Err(MediaError::Storage(format!(
                    "Failed to open blob {}: {}",
                    stored.id, e
                )));
            }
        };

        let size = file
            .metadata()
            .await
            .map_err(|e| {
                MediaError::Storage(format!("Failed to stat blob {}: {}", stored.id, e))
            })?
            .len();

        Ok(Some(BlobContent {
            id: stored.id,
            filename: stored.original_name,
            size,
            file,
        }))
    }
}

/// Whether two existing directories live on the same device
#[cfg(unix)]
async fn same_filesystem(a: &Path, b: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    Ok(fs::metadata(a).await?.dev() == fs::metadata(b).await?.dev())
}

#[cfg(not(unix))]
async fn same_filesystem(_a: &Path, _b: &Path) -> std::io::Result<bool> {
    Ok(true)
}

async fn next_entry(entries: &mut fs::ReadDir) -> MediaResult<Option<DirEntry>> {
    entries
        .next_entry()
        .await
        .map_err(|e| MediaError::Storage(format!("Failed to scan storage root: {}", e)))
}

/// Regular file, or symlink to one. Entries that vanish mid-scan count as not.
async fn is_regular_file(entry: &DirEntry) -> bool {
    match entry.file_type().await {
        Ok(ft) if ft.is_file() => true,
        Ok(ft) if ft.is_symlink() => fs::metadata(entry.path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl BlobBackend for DiskBlobStore {
    async fn upload(&self, data: Vec<u8>, original_filename: &str) -> MediaResult<UploadedBlob> {
        if data.is_empty() {
            metrics::record_blob_operation("upload", "rejected");
            return Err(MediaError::Validation("empty file".to_string()));
        }

        let filename = sanitize_filename(original_filename);
        let id = BlobId::generate();
        let stored = StoredName::new(id, filename.clone());

        let staging_path = self.tmp_location.join(format!("{}.part", id));
        let final_path = self.root.join(stored.to_string());

        if let Err(e) = self.commit(id, &data, &staging_path, &final_path).await {
            tracing::error!(id = %id, error = %e, "blob upload failed");
            metrics::record_blob_operation("upload", "error");
            return Err(e);
        }

        tracing::debug!(id = %id, filename = %filename, size = data.len(), "stored blob");
        metrics::record_blob_upload(data.len());

        Ok(UploadedBlob {
            id: id.to_string(),
            filename,
        })
    }

    async fn list(&self) -> MediaResult<Vec<BlobEntry>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                metrics::record_blob_operation("list", "error");
                return Err(MediaError::Storage(format!(
                    "Failed to read storage root: {}",
                    e
                )));
            }
        };

        let mut blobs = Vec::new();
        while let Some(entry) = next_entry(&mut entries).await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!(name = ?raw, "skipping non UTF-8 file name");
                    continue;
                }
            };
            if is_regular_file(&entry).await {
                blobs.push(BlobEntry::from(StoredName::parse(&name)));
            }
        }

        metrics::record_blob_operation("list", "ok");
        Ok(blobs)
    }

    async fn get(&self, id: &str) -> MediaResult<Option<BlobContent>> {
        let Some((path, stored)) = self.find(id).await? else {
            metrics::record_blob_operation("get", "not_found");
            return Ok(None);
        };

        let content = self.open_matched(&path, stored).await;
        let outcome = match &content {
            Ok(Some(_)) => "ok",
            Ok(None) => "not_found",
            Err(_) => "error",
        };
        metrics::record_blob_operation("get", outcome);
        content
    }

    async fn delete(&self, id: &str) -> MediaResult<bool> {
        let Some((path, _)) = self.find(id).await? else {
            metrics::record_blob_operation("delete", "not_found");
            return Ok(false);
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(id = %id, "deleted blob");
                metrics::record_blob_operation("delete", "ok");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                metrics::record_blob_operation("delete", "not_found");
                Ok(false)
            }
            Err(e) => {
                metrics::record_blob_operation("delete", "error");
                Err(MediaError::Storage(format!(
                    "Failed to delete blob {}: {}",
                    id, e
                )))
            }
        }
    }

    async fn health_check(&self) -> MediaResult<()> {
        let meta = fs::metadata(&self.root)
            .await
            .map_err(|e| MediaError::Storage(format!("Storage root unavailable: {}", e)))?;

        if !meta.is_dir() {
            return Err(MediaError::Storage("Storage root is not a directory".to_string()));
        }
        if meta.permissions().readonly() {
            return Err(MediaError::Storage("Storage root is read-only".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tokio::io::AsyncReadExt;

    async fn create_test_store() -> (DiskBlobStore, TempDir) {
        let dir = tempdir().unwrap();
        let root = dir.path().join("media");
        let store = DiskBlobStore::open(BlobStoreConfig {
            tmp_location: root.join(".tmp"),
            root,
        })
        .await
        .unwrap();
        (store, dir)
    }

    async fn read_all(content: BlobContent) -> Vec<u8> {
        let mut file = content.file;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    fn files_in(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let (store, _dir) = create_test_store().await;
        assert!(store.root().is_dir());
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_file_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"x").unwrap();

        let result = DiskBlobStore::open(BlobStoreConfig {
            tmp_location: dir.path().join("tmp"),
            root,
        })
        .await;

        assert!(matches!(result, Err(MediaError::Startup(_))));
    }

    #[tokio::test]
    async fn test_upload_and_get_round_trip() {
        let (store, _dir) = create_test_store().await;
        let data = b"\x00\x01binary\xffdata".to_vec();

        let uploaded = store.upload(data.clone(), "a.txt").await.unwrap();
        assert_eq!(uploaded.filename, "a.txt");

        let content = store.get(&uploaded.id).await.unwrap().unwrap();
        assert_eq!(content.id, uploaded.id);
        assert_eq!(content.filename, "a.txt");
        assert_eq!(content.size, data.len() as u64);
        assert_eq!(read_all(content).await, data);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_content() {
        let (store, _dir) = create_test_store().await;

        let result = store.upload(Vec::new(), "empty.txt").await;

        assert!(matches!(result, Err(MediaError::Validation(_))));
        assert!(files_in(store.root()).is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_ids_are_fresh() {
        let (store, _dir) = create_test_store().await;

        let first = store.upload(b"one".to_vec(), "same.txt").await.unwrap();
        let second = store.upload(b"two".to_vec(), "same.txt").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_leaves_no_staged_files() {
        let (store, _dir) = create_test_store().await;

        store.upload(b"data".to_vec(), "x.bin").await.unwrap();

        assert!(files_in(&store.tmp_location).is_empty());
        assert_eq!(files_in(store.root()).len(), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_nothing_visible() {
        let dir = tempdir().unwrap();
        let store = DiskBlobStore::open(BlobStoreConfig {
            root: dir.path().join("media"),
            tmp_location: dir.path().join("staging"),
        })
        .await
        .unwrap();

        // Replace the staging directory with a plain file so staging fails
        std::fs::remove_dir_all(&store.tmp_location).unwrap();
        std::fs::write(&store.tmp_location, b"blocker").unwrap();

        let result = store.upload(b"data".to_vec(), "x.bin").await;

        assert!(matches!(result, Err(MediaError::Storage(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_removes_staged_file() {
        let (store, _dir) = create_test_store().await;
        let id = BlobId::generate();
        let staging_path = store.tmp_location.join(format!("{}.part", id));

        // A non-empty directory at the final name makes the rename fail after staging
        let final_path = store.root().join(format!("{}__x.bin", id));
        std::fs::create_dir(&final_path).unwrap();
        std::fs::write(final_path.join("occupied"), b"x").unwrap();

        let result = store
            .commit(id, b"data", &staging_path, &final_path)
            .await;

        assert!(matches!(result, Err(MediaError::Storage(_))));
        assert!(!staging_path.exists());
        assert!(files_in(&store.tmp_location).is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_after_concurrent_delete_is_not_found() {
        let (store, _dir) = create_test_store().await;
        let uploaded = store.upload(b"gone".to_vec(), "gone.txt").await.unwrap();

        let (path, stored) = store.find(&uploaded.id).await.unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();

        let content = store.open_matched(&path, stored).await.unwrap();
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_open_accepts_staging_on_same_filesystem() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("media");
        let tmp_location = dir.path().join("staging");

        DiskBlobStore::open(BlobStoreConfig {
            root: root.clone(),
            tmp_location: tmp_location.clone(),
        })
        .await
        .unwrap();

        assert!(same_filesystem(&root, &tmp_location).await.unwrap());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_open_rejects_staging_on_other_filesystem() {
        let dir = tempdir().unwrap();
        let Ok(other) = tempfile::tempdir_in("/dev/shm") else {
            return;
        };
        if same_filesystem(dir.path(), other.path()).await.unwrap() {
            return;
        }

        let result = DiskBlobStore::open(BlobStoreConfig {
            root: dir.path().join("media"),
            tmp_location: other.path().join("staging"),
        })
        .await;

        assert!(matches!(result, Err(MediaError::Startup(_))));
    }

    #[tokio::test]
    async fn test_traversal_name_stays_inside_root() {
        let (store, _dir) = create_test_store().await;

        let uploaded = store
            .upload(b"root:x:0:0".to_vec(), "../../etc/passwd")
            .await
            .unwrap();
        assert_eq!(uploaded.filename, "passwd");

        let stored = files_in(store.root());
        assert_eq!(stored, vec![format!("{}__passwd", uploaded.id)]);

        let resolved = store.root().join(&stored[0]).canonicalize().unwrap();
        let root = store.root().canonicalize().unwrap();
        assert_eq!(resolved.parent(), Some(root.as_path()));
    }

    #[tokio::test]
    async fn test_list_parses_names_and_skips_directories() {
        let (store, _dir) = create_test_store().await;

        let uploaded = store.upload(b"hello".to_vec(), "a__b.txt").await.unwrap();
        std::fs::write(store.root().join("foreign.txt"), b"legacy").unwrap();
        std::fs::create_dir(store.root().join("nested__dir")).unwrap();

        let mut listed = store.list().await.unwrap();
        listed.sort_by(|a, b| a.filename.cmp(&b.filename));

        assert_eq!(
            listed,
            vec![
                BlobEntry {
                    id: uploaded.id.clone(),
                    filename: "a__b.txt".to_string(),
                },
                BlobEntry {
                    id: "foreign.txt".to_string(),
                    filename: "foreign.txt".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let (store, _dir) = create_test_store().await;
        std::fs::remove_dir_all(store.root()).unwrap();

        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_recreates_removed_root() {
        let (store, _dir) = create_test_store().await;
        std::fs::remove_dir_all(store.root()).unwrap();

        let uploaded = store.upload(b"again".to_vec(), "r.txt").await.unwrap();

        assert!(store.get(&uploaded.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_then_absent() {
        let (store, _dir) = create_test_store().await;
        let uploaded = store.upload(b"bye".to_vec(), "bye.txt").await.unwrap();

        assert!(store.delete(&uploaded.id).await.unwrap());

        assert!(store.get(&uploaded.id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        assert!(!store.delete(&uploaded.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_twice() {
        let (store, _dir) = create_test_store().await;

        assert!(!store.delete("no-such-id").await.unwrap());
        assert!(!store.delete("no-such-id").await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_requires_full_id_prefix() {
        let (store, _dir) = create_test_store().await;
        let uploaded = store.upload(b"data".to_vec(), "doc.txt").await.unwrap();

        let partial = &uploaded.id[..8];
        assert!(store.get(partial).await.unwrap().is_none());
        assert!(store.get("").await.unwrap().is_none());
        assert!(store.get("../media").await.unwrap().is_none());
        assert!(!store.delete(partial).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_file_cannot_be_fetched_by_name() {
        let (store, _dir) = create_test_store().await;
        std::fs::write(store.root().join("README"), b"legacy").unwrap();

        // Listed under its full name, but lookup is by "<id>__" prefix only
        assert_eq!(store.list().await.unwrap()[0].id, "README");
        assert!(store.get("README").await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_content_survives_concurrent_delete() {
        let (store, _dir) = create_test_store().await;
        let data = vec![7u8; 64 * 1024];
        let uploaded = store.upload(data.clone(), "big.bin").await.unwrap();

        let content = store.get(&uploaded.id).await.unwrap().unwrap();
        assert!(store.delete(&uploaded.id).await.unwrap());

        assert_eq!(read_all(content).await, data);
        assert!(store.get(&uploaded.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_uploads() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .upload(format!("payload {}", i).into_bytes(), "same.txt")
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().id);
        }

        assert_eq!(ids.len(), 16);
        assert_eq!(store.list().await.unwrap().len(), 16);
    }
}
