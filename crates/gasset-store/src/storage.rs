use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{BackendError, BackendResult};
use crate::traits::{BlobMetadata, Storage};

/// Blob storage rooted at a local directory.
///
/// Blob names are `/`-separated relative paths. Writes go through a
/// temporary file in the target directory followed by a rename, so a reader
/// never observes a partially written blob.
#[derive(Clone, Debug)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (creating if needed) the storage directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(id);
        let valid = !id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(BackendError::InvalidConfig(format!("invalid blob name {id:?}")));
        }
        Ok(self.root.join(relative))
    }

    pub fn get_blob(&self, id: &str) -> BackendResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path(id)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn blob_exists(&self, id: &str) -> BackendResult<bool> {
        Ok(self.blob_path(id)?.is_file())
    }

    pub fn put_blob(&self, id: &str, data: &[u8]) -> BackendResult<()> {
        let path = self.blob_path(id)?;
        let dir = path
            .parent()
            .ok_or_else(|| BackendError::InvalidConfig(format!("blob {id:?} has no parent")))?;
        fs::create_dir_all(dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| BackendError::Io(e.error))?;
        Ok(())
    }

    /// Returns `true` if the blob existed.
    pub fn delete_blob(&self, id: &str) -> BackendResult<bool> {
        match fs::remove_file(self.blob_path(id)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Synchronous listing, sorted by name.
    pub fn list(&self, prefix: &str, limit: Option<usize>) -> BackendResult<Vec<BlobMetadata>> {
        let mut blobs = Vec::new();
        let walker = WalkDir::new(&self.root).sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| {
                BackendError::Io(e.into_io_error().unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::Other, "filesystem loop in storage")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !id.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| {
                BackendError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "metadata")),
                )
            })?;
            let timestamp = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            blobs.push(BlobMetadata {
                id,
                length: meta.len(),
                timestamp,
            });
            if limit.is_some_and(|limit| blobs.len() >= limit) {
                break;
            }
        }
        Ok(blobs)
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn list_blobs(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<BlobMetadata>> {
        let storage = self.clone();
        let prefix = prefix.to_string();
        crate::blocking(move || storage.list(&prefix, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(dir.path()).unwrap();
        storage.put_blob("objects/ab/abcdef", b"data").unwrap();
        assert!(storage.blob_exists("objects/ab/abcdef").unwrap());
        assert_eq!(
            storage.get_blob("objects/ab/abcdef").unwrap().as_deref(),
            Some(&b"data"[..])
        );
        assert!(storage.delete_blob("objects/ab/abcdef").unwrap());
        assert!(!storage.delete_blob("objects/ab/abcdef").unwrap());
        assert!(storage.get_blob("objects/ab/abcdef").unwrap().is_none());
    }

    #[test]
    fn rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(dir.path()).unwrap();
        assert!(storage.put_blob("../escape", b"x").is_err());
        assert!(storage.get_blob("/etc/passwd").is_err());
        assert!(storage.get_blob("").is_err());
    }

    #[test]
    fn list_filters_by_prefix_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(dir.path()).unwrap();
        storage.put_blob("manifests/a.json", b"{}").unwrap();
        storage.put_blob("manifests/b.json", b"{}").unwrap();
        storage.put_blob("objects/00/00aa", b"x").unwrap();

        let manifests = storage.list("manifests/", None).unwrap();
        let ids: Vec<_> = manifests.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["manifests/a.json", "manifests/b.json"]);

        assert_eq!(storage.list("", Some(1)).unwrap().len(), 1);
        assert_eq!(storage.list("", None).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_storage_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(dir.path().join("fresh")).unwrap();
        assert!(storage.list_blobs("", Some(1)).await.unwrap().is_empty());
    }
}
