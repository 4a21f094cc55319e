//! Local filesystem storage backend.
//!
//! Keys map to paths below a root directory. Used for local runs against a mirrored
//! collection and for tests.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    DeleteFailure, DeleteReport, ListingOptions, ListingPage, ObjectEntry, ObjectStore,
    PageStream, check_delete_batch,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Marker embedded in in-flight temp file names; such files are never listed.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem object store.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, rejecting keys that would escape the root.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "key must be a non-empty relative path: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        Ok(self.root.join(key))
    }

    /// Directory to walk for a listing prefix: everything up to the last `/`.
    fn listing_dir(&self, prefix: &str) -> StorageResult<PathBuf> {
        match prefix.rfind('/') {
            Some(idx) => self.key_path(&prefix[..idx]),
            None => Ok(self.root.clone()),
        }
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    async fn delete_one(&self, key: &str) -> Result<(), String> {
        let path = self.key_path(key).map_err(|e| e.to_string())?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        let prefix = prefix.to_string();
        let page_size = options.normalized_page_size();

        let stream = async_stream::try_stream! {
            let base_path = self.listing_dir(&prefix)?;

            // Check existence, propagating IO errors but treating NotFound as empty
            let base_path_exists = match fs::try_exists(&base_path).await {
                Ok(exists) => exists,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => Err(StorageError::Io(e))?,
            };
            if !base_path_exists {
                return;
            }

            let mut stack = vec![base_path];
            let mut current_page = Vec::with_capacity(page_size);

            while let Some(dir) = stack.pop() {
                let mut entries = fs::read_dir(&dir).await?;
                let mut files = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    // file_type() does not follow symlinks; symlinks are ignored.
                    let file_type = entry.file_type().await?;
                    if file_type.is_dir() {
                        stack.push(entry.path());
                    } else if file_type.is_file() {
                        files.push(entry);
                    }
                }
                files.sort_by_key(|entry| entry.file_name());

                for entry in files {
                    let path = entry.path();
                    if entry.file_name().to_string_lossy().contains(TEMP_MARKER) {
                        continue;
                    }
                    let Some(key) = self.relative_key(&path) else {
                        continue;
                    };
                    if !key.starts_with(&prefix) {
                        continue;
                    }
                    let size = entry.metadata().await?.len();
                    current_page.push(ObjectEntry::new(key, size));

                    if current_page.len() >= page_size {
                        yield ListingPage {
                            objects: std::mem::replace(
                                &mut current_page,
                                Vec::with_capacity(page_size),
                            ),
                        };
                    }
                }
            }

            if !current_page.is_empty() {
                yield ListingPage { objects: current_page };
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename for atomicity.
        let temp_name = format!("{TEMP_MARKER}{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "filesystem", count = keys.len()))]
    async fn delete_many(&self, keys: &[String]) -> StorageResult<DeleteReport> {
        check_delete_batch(keys)?;

        let mut report = DeleteReport::default();
        for key in keys {
            match self.delete_one(key).await {
                Ok(()) => report.deleted.push(key.clone()),
                Err(message) => report.failed.push(DeleteFailure {
                    key: key.clone(),
                    message,
                }),
            }
        }
        Ok(report)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_key_path_rejects_traversal() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        for key in ["../escape", "/abs/key", "a/../../b", ""] {
            assert!(
                matches!(backend.key_path(key), Err(StorageError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
        assert!(backend.key_path("C__1/G1.cmr.xml").is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_by_string_prefix() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        for key in ["C__1/a/G1.cmr.xml", "C__1/b/G2.cmr.json", "C__2/G3.cmr.xml"] {
            backend.put(key, Bytes::from_static(b"xyz")).await.unwrap();
        }

        let mut keys = Vec::new();
        let mut stream = backend.list_pages("C__1/", ListingOptions::default());
        while let Some(page) = stream.next().await {
            keys.extend(page.unwrap().objects.into_iter().map(|o| o.key));
        }
        keys.sort();
        assert_eq!(keys, vec!["C__1/a/G1.cmr.xml", "C__1/b/G2.cmr.json"]);
    }

    #[tokio::test]
    async fn test_missing_prefix_lists_nothing() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let mut stream = backend.list_pages("nothing/here/", ListingOptions::default());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_delete_absent_key_counts_as_deleted() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        backend
            .put("C__1/G1.cmr.xml", Bytes::from_static(b"<x/>"))
            .await
            .unwrap();

        let report = backend
            .delete_many(&["C__1/G1.cmr.xml".to_string(), "C__1/G9.cmr.xml".to_string()])
            .await
            .unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(report.is_complete());
        assert!(!temp.path().join("C__1/G1.cmr.xml").exists());
    }

    #[tokio::test]
    async fn test_delete_reports_invalid_key_as_failure() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let report = backend
            .delete_many(&["../outside".to_string()])
            .await
            .unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "../outside");
    }
}
