//! Directory uploader for the filesystem backend.
//!
//! Walks a source directory bottom-up, stores every file as a blob and every
//! directory as a [`Tree`], and returns the manifest of the attempt. Files
//! whose size and modification time match an entry in one of the previous
//! manifests reuse that entry's object without being read.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::UNIX_EPOCH;

use chrono::Utc;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use gasset_types::{
    DirectorySummary, EntryKind, LogDetail, ObjectId, Policy, RootEntry, SnapshotManifest,
    SourceInfo,
};

use crate::error::{BackendError, BackendResult};
use crate::object::{self, ContentHasher, Tree, TreeEntry};
use crate::storage::FsStorage;

pub const LIMIT_REACHED: &str = "limit reached";

#[derive(Clone, Copy, Debug)]
struct CachedFile {
    size: u64,
    modified_ns: u64,
    object: ObjectId,
}

pub struct Uploader<'a> {
    storage: &'a FsStorage,
    policy: &'a Policy,
    cancel: Option<&'a AtomicBool>,
    cache: HashMap<PathBuf, CachedFile>,
    uploaded_bytes: u64,
    limit_reached: bool,
    summary: DirectorySummary,
}

impl<'a> Uploader<'a> {
    pub fn new(storage: &'a FsStorage, policy: &'a Policy) -> Self {
        Self {
            storage,
            policy,
            cancel: None,
            cache: HashMap::new(),
            uploaded_bytes: 0,
            limit_reached: false,
            summary: DirectorySummary::default(),
        }
    }

    /// Stop the walk with [`BackendError::Cancelled`] once `flag` is set.
    pub fn with_cancel(self, flag: &'a AtomicBool) -> Self {
        Self {
            cancel: Some(flag),
            ..self
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Seed the file cache from previous manifests. Earlier manifests win,
    /// so the baseline (first element) takes priority.
    pub fn with_previous(mut self, previous: &[SnapshotManifest]) -> BackendResult<Self> {
        for manifest in previous {
            if manifest.root_entry.kind != EntryKind::Directory {
                continue;
            }
            self.load_tree(&manifest.root_object(), PathBuf::new())?;
        }
        debug!(cached = self.cache.len(), "seeded upload cache from previous snapshots");
        Ok(self)
    }

    fn load_tree(&mut self, id: &ObjectId, prefix: PathBuf) -> BackendResult<()> {
        let Some(stored) = self.storage.get_blob(&object::object_blob_id(id))? else {
            // A pruned or foreign root is not fatal; it only loses the cache.
            warn!(tree = %id.short_hex(), "previous snapshot tree missing");
            return Ok(());
        };
        let tree = Tree::from_bytes(&object::decode(&stored)?)?;
        for entry in tree.entries {
            let path = prefix.join(&entry.name);
            match entry.kind {
                EntryKind::Directory => self.load_tree(&entry.object, path)?,
                EntryKind::File => {
                    self.cache.entry(path).or_insert(CachedFile {
                        size: entry.size,
                        modified_ns: entry.modified_ns,
                        object: entry.object,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn upload(mut self, path: &Path, source: &SourceInfo) -> BackendResult<SnapshotManifest> {
        let start_time = Utc::now();
        let ignore = self.ignore_matcher(path)?;
        let ignore_file_errors = self.policy.error_handling.ignore_file_errors.unwrap_or(false);
        let ignore_dir_errors = self
            .policy
            .error_handling
            .ignore_directory_errors
            .unwrap_or(false);
        let one_file_system = self.policy.files.one_file_system.unwrap_or(false);

        // Children are visited before their directory, so finished entries
        // wait here keyed by their parent directory.
        let mut pending: HashMap<PathBuf, Vec<TreeEntry>> = HashMap::new();
        let mut root: Option<RootEntry> = None;

        let walker = WalkDir::new(path)
            .contents_first(true)
            .sort_by_file_name()
            .same_file_system(one_file_system)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || {
                    let is_dir = e.file_type().is_dir();
                    !ignore.matched_path_or_any_parents(e.path(), is_dir).is_ignore()
                }
            });

        for entry in walker {
            if self.is_cancelled() {
                info!(path = %path.display(), "upload cancelled");
                return Err(BackendError::Cancelled);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let is_dir_error = e.path().is_some_and(|p| p.is_dir());
                    let ignorable = if is_dir_error { ignore_dir_errors } else { ignore_file_errors };
                    if ignorable && e.depth() > 0 {
                        warn!(error = %e, "skipping unreadable entry");
                        self.summary.ignored_error_count += 1;
                        continue;
                    }
                    return Err(walk_error(e));
                }
            };

            let file_type = entry.file_type();
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = entry
                .path()
                .strip_prefix(path)
                .unwrap_or(entry.path())
                .to_path_buf();

            let tree_entry = if file_type.is_dir() {
                let children = pending.remove(entry.path()).unwrap_or_default();
                let tree = Tree::new(children);
                let id = self.store_tree(&tree)?;
                self.summary.total_dir_count += 1;
                // Directory mtimes stay out of the tree so that only content
                // changes move the root.
                TreeEntry {
                    name,
                    kind: EntryKind::Directory,
                    object: id,
                    size: 0,
                    modified_ns: 0,
                }
            } else if file_type.is_file() {
                match self.upload_file(entry.path(), &relative) {
                    Ok(Some(e)) => TreeEntry { name, ..e },
                    Ok(None) => continue,
                    Err(e) if ignore_file_errors && entry.depth() > 0 => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                        self.summary.ignored_error_count += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                debug!(path = %entry.path().display(), "skipping special file");
                continue;
            };

            if entry.depth() == 0 {
                root = Some(RootEntry {
                    kind: tree_entry.kind,
                    object: tree_entry.object,
                    summary: DirectorySummary::default(),
                });
            } else if let Some(parent) = entry.path().parent() {
                pending.entry(parent.to_path_buf()).or_default().push(tree_entry);
            }
        }

        let root = root.ok_or_else(|| {
            BackendError::NotFound(format!("nothing to snapshot at {}", path.display()))
        })?;
        let mut manifest = SnapshotManifest::new(source.clone(), start_time, root.object)
            .with_end_time(Utc::now())
            .with_summary(self.summary.clone());
        manifest.root_entry.kind = root.kind;
        if self.limit_reached {
            manifest = manifest.with_incomplete_reason(LIMIT_REACHED);
        }
        info!(
            source = %source,
            files = self.summary.total_file_count,
            cached = self.summary.cached_file_count,
            bytes = self.summary.total_file_size,
            complete = manifest.is_complete(),
            "upload finished"
        );
        Ok(manifest)
    }

    fn ignore_matcher(&self, root: &Path) -> BackendResult<Gitignore> {
        let mut builder = GitignoreBuilder::new(root);
        for rule in self.policy.files.ignore.iter().flatten() {
            builder
                .add_line(None, rule)
                .map_err(|e| BackendError::InvalidConfig(format!("ignore rule {rule:?}: {e}")))?;
        }
        builder
            .build()
            .map_err(|e| BackendError::InvalidConfig(format!("ignore rules: {e}")))
    }

    /// Returns `None` when the file was skipped because the upload limit was
    /// reached.
    fn upload_file(&mut self, path: &Path, relative: &Path) -> BackendResult<Option<TreeEntry>> {
        let meta = fs::metadata(path)?;
        let size = meta.len();
        let modified = modified_ns(&meta);

        if let Some(cached) = self.cache.get(relative) {
            if cached.size == size && cached.modified_ns == modified {
                self.log_entry(relative, "cached");
                self.summary.total_file_count += 1;
                self.summary.total_file_size += size;
                self.summary.cached_file_count += 1;
                return Ok(Some(file_entry(cached.object, size, modified)));
            }
        }

        if self.limit_reached {
            return Ok(None);
        }

        let data = fs::read(path)?;
        let id = ContentHasher::BLOB.hash(&data);
        let blob_id = object::object_blob_id(&id);
        if !self.storage.blob_exists(&blob_id)? {
            let compression = &self.policy.compression;
            let compressor = if data.len() as u64 >= compression.min_size.unwrap_or(0) {
                compression.compressor()
            } else {
                Default::default()
            };
            self.storage.put_blob(&blob_id, &object::encode(&data, compressor)?)?;
            self.uploaded_bytes += data.len() as u64;
            if let Some(limit) = self.policy.upload.upload_limit() {
                if self.uploaded_bytes >= limit {
                    info!(limit, "upload limit reached, remaining files skipped");
                    self.limit_reached = true;
                }
            }
        }
        self.log_entry(relative, "uploaded");
        self.summary.total_file_count += 1;
        self.summary.total_file_size += size;
        Ok(Some(file_entry(id, size, modified)))
    }

    fn store_tree(&self, tree: &Tree) -> BackendResult<ObjectId> {
        let id = tree.compute_id()?;
        let blob_id = object::object_blob_id(&id);
        if !self.storage.blob_exists(&blob_id)? {
            let encoded = object::encode(&tree.to_bytes()?, self.policy.compression.compressor())?;
            self.storage.put_blob(&blob_id, &encoded)?;
        }
        Ok(id)
    }

    fn log_entry(&self, relative: &Path, action: &str) {
        if self.policy.logging.entries.unwrap_or_default() >= LogDetail::Verbose {
            debug!(path = %relative.display(), action, "snapshot entry");
        }
    }
}

fn file_entry(object: ObjectId, size: u64, modified_ns: u64) -> TreeEntry {
    TreeEntry {
        name: String::new(),
        kind: EntryKind::File,
        object,
        size,
        modified_ns,
    }
}

fn modified_ns(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn walk_error(e: walkdir::Error) -> BackendError {
    let message = e.to_string();
    BackendError::Io(
        e.into_io_error()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasset_types::{Compressor, FilesPolicy, UploadPolicy};

    fn source(path: &Path) -> SourceInfo {
        SourceInfo::new("host", "user", path)
    }

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[test]
    fn same_content_same_root() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "textures/a.png", b"aaaa");
        write(src.path(), "b.bin", b"bbbb");
        let policy = Policy::default_baseline();

        let first = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();
        let second = Uploader::new(&storage, &policy)
            .with_previous(std::slice::from_ref(&first))
            .unwrap()
            .upload(src.path(), &source(src.path()))
            .unwrap();

        assert!(first.is_complete());
        assert_eq!(first.root_object(), second.root_object());
        assert_eq!(first.root_entry.summary.total_file_count, 2);
        assert_eq!(second.root_entry.summary.cached_file_count, 2);
    }

    #[test]
    fn changed_file_changes_root() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt", b"one");
        let policy = Policy::default_baseline();
        let first = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();
        write(src.path(), "a.txt", b"two, longer");
        let second = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();
        assert_ne!(first.root_object(), second.root_object());
    }

    #[test]
    fn ignore_rules_skip_files() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "keep.png", b"k");
        write(src.path(), "cache/skip.tmp", b"s");
        let policy = Policy {
            files: FilesPolicy {
                ignore: Some(vec!["cache/".into()]),
                one_file_system: None,
            },
            ..Policy::default_baseline()
        };
        let manifest = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();
        assert_eq!(manifest.root_entry.summary.total_file_count, 1);
    }

    #[test]
    fn upload_limit_marks_incomplete() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "a.bin", &[1u8; 64]);
        write(src.path(), "b.bin", &[2u8; 64]);
        let policy = Policy {
            upload: UploadPolicy {
                max_upload_bytes: Some(10),
            },
            compression: gasset_types::CompressionPolicy {
                compressor: Some(Compressor::Zstd),
                min_size: None,
            },
            ..Policy::default_baseline()
        };
        let manifest = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();
        assert!(!manifest.is_complete());
        assert_eq!(manifest.incomplete_reason, LIMIT_REACHED);
        assert_eq!(manifest.root_entry.summary.total_file_count, 1);
    }

    #[test]
    fn transient_file_leaves_root_unchanged() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "sounds/theme.ogg", b"ogg");
        let policy = Policy::default_baseline();
        let first = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        write(src.path(), "sounds/theme.ogg.swp", b"tmp");
        fs::remove_file(src.path().join("sounds/theme.ogg.swp")).unwrap();

        let second = Uploader::new(&storage, &policy)
            .upload(src.path(), &source(src.path()))
            .unwrap();
        assert_eq!(first.root_object(), second.root_object());
    }

    #[test]
    fn cancelled_upload_stops() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "a.bin", b"a");
        let policy = Policy::default_baseline();
        let cancel = AtomicBool::new(true);
        let result = Uploader::new(&storage, &policy)
            .with_cancel(&cancel)
            .upload(src.path(), &source(src.path()));
        assert!(matches!(result, Err(BackendError::Cancelled)));
        assert!(storage.list("objects/", None).unwrap().is_empty());
    }

    #[test]
    fn missing_source_fails() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(store_dir.path()).unwrap();
        let missing = store_dir.path().join("nope");
        let policy = Policy::default_baseline();
        assert!(Uploader::new(&storage, &policy)
            .upload(&missing, &source(&missing))
            .is_err());
    }
}
