use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gasset_types::{BackendConfig, ClientOptions, StorageConfig};

use crate::blocking;
use crate::error::{BackendError, BackendResult};
use crate::format::RepositoryFormat;
use crate::repository::FsRepository;
use crate::storage::FsStorage;
use crate::traits::Backend;

/// Storage `type` served by [`FsBackend`].
pub const FILESYSTEM_STORAGE: &str = "filesystem";

/// Contents of a connection file: enough to reopen the repository without
/// the project config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFile {
    pub storage: StorageConfig,
    pub client_options: ClientOptions,
}

/// Backend that keeps repositories in local directories.
///
/// A relative storage `path` is resolved against the base directory, when
/// one is set, and against the process working directory otherwise.
///
/// Clones share one cancel flag. [`FsBackend::cancel`] stops uploads running
/// in any repository opened from it.
#[derive(Clone, Debug, Default)]
pub struct FsBackend {
    base_dir: Option<PathBuf>,
    cancel: Arc<AtomicBool>,
}

impl FsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::default()
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// A storage config pointing at `path`.
    pub fn storage_config(path: impl AsRef<Path>) -> StorageConfig {
        StorageConfig::new(
            FILESYSTEM_STORAGE,
            serde_json::json!({ "path": path.as_ref().to_string_lossy() }),
        )
    }

    fn storage_root(&self, storage: &StorageConfig) -> BackendResult<PathBuf> {
        if storage.kind != FILESYSTEM_STORAGE {
            return Err(BackendError::UnsupportedStorage(storage.kind.clone()));
        }
        let path = storage
            .config
            .get("path")
            .and_then(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BackendError::InvalidConfig("storage.config.path is required".into()))?;
        let path = PathBuf::from(path);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl Backend for FsBackend {
    type Storage = FsStorage;
    type Repository = FsRepository;

    async fn load_config(&self, path: &Path) -> BackendResult<BackendConfig> {
        let path = path.to_path_buf();
        blocking(move || {
            let data = fs::read(&path)?;
            let mut config: BackendConfig =
                serde_json::from_slice(&data).map_err(|e| BackendError::InvalidConfig(e.to_string()))?;
            let options = &mut config.client_options;
            if options.hostname.is_empty() {
                options.hostname =
                    whoami::fallible::hostname().unwrap_or_else(|_| "unknown".into());
            }
            if options.username.is_empty() {
                options.username = whoami::username();
            }
            Ok(config)
        })
        .await
    }

    async fn new_storage(&self, config: &BackendConfig) -> BackendResult<FsStorage> {
        let root = self.storage_root(&config.storage)?;
        debug!(root = %root.display(), "opening filesystem storage");
        blocking(move || FsStorage::open(root)).await
    }

    async fn initialize(&self, storage: &FsStorage, password: &str) -> BackendResult<()> {
        let storage = storage.clone();
        let password = password.to_string();
        blocking(move || {
            if RepositoryFormat::read(&storage)?.is_some() {
                return Err(BackendError::AlreadyExists(format!(
                    "repository in {}",
                    storage.root().display()
                )));
            }
            RepositoryFormat::create(&password).write(&storage)?;
            info!(root = %storage.root().display(), "repository initialized");
            Ok(())
        })
        .await
    }

    async fn connect(
        &self,
        connection_path: &Path,
        storage: &FsStorage,
        password: &str,
        client_options: &ClientOptions,
    ) -> BackendResult<()> {
        let connection = ConnectionFile {
            storage: Self::storage_config(storage.root()),
            client_options: client_options.clone(),
        };
        let storage = storage.clone();
        let password = password.to_string();
        let connection_path = connection_path.to_path_buf();
        blocking(move || {
            RepositoryFormat::read_and_verify(&storage, &password)?;
            write_atomic(&connection_path, &serde_json::to_vec_pretty(&connection)?)?;
            debug!(path = %connection_path.display(), "connection file written");
            Ok(())
        })
        .await
    }

    async fn open(&self, connection_path: &Path, password: &str) -> BackendResult<FsRepository> {
        let data = match tokio::fs::read(connection_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::NotConnected(connection_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let connection: ConnectionFile =
            serde_json::from_slice(&data).map_err(|e| BackendError::Corrupt {
                what: connection_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let root = self.storage_root(&connection.storage)?;
        let password = password.to_string();
        let storage = blocking(move || {
            let storage = FsStorage::open(root)?;
            RepositoryFormat::read_and_verify(&storage, &password)?;
            Ok(storage)
        })
        .await?;
        debug!(root = %storage.root().display(), "repository opened");
        Ok(FsRepository::new(
            storage,
            connection_path.to_path_buf(),
            connection.client_options,
        )
        .with_cancel(self.cancel.clone()))
    }
}
