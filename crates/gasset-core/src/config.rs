//! Project configuration: the `.gasset` file at the project root.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use gasset_store::Backend;
use gasset_types::{BackendConfig, ProjectId};

use crate::error::{GassetError, GassetResult};
use crate::secrets::{self, Credentials};

pub const PROJECT_FILE: &str = ".gasset";

/// Persisted project configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub backend_config: BackendConfig,
    /// Empty until a repository has been created for this project.
    #[serde(default)]
    pub durable_identity: String,
    /// Directories to snapshot, relative to the project root.
    #[serde(default)]
    pub source_directories: Vec<PathBuf>,
    /// Keys gasset does not read, preserved across rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectConfig {
    pub fn new(backend_config: BackendConfig) -> Self {
        Self {
            backend_config,
            durable_identity: String::new(),
            source_directories: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_source_directories(self, source_directories: Vec<PathBuf>) -> Self {
        Self {
            source_directories,
            ..self
        }
    }

    pub fn with_identity(self, identity: &ProjectId) -> Self {
        Self {
            durable_identity: identity.to_string(),
            ..self
        }
    }

    /// The persisted identity, if one has been assigned.
    pub fn identity(&self) -> Option<Result<ProjectId, gasset_types::TypeError>> {
        (!self.durable_identity.is_empty()).then(|| ProjectId::parse(&self.durable_identity))
    }
}

/// Everything needed to talk to the backend for one project.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    pub project: ProjectConfig,
    /// Normalized by the backend, with access keys attached. Never persisted.
    pub backend_config: BackendConfig,
    pub credentials: Credentials,
}

pub fn project_file(root: &Path) -> PathBuf {
    root.join(PROJECT_FILE)
}

pub fn load(root: &Path) -> GassetResult<ProjectConfig> {
    let path = project_file(root);
    let data = fs::read(&path).map_err(|source| GassetError::ConfigRead {
        path: path.clone(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|e| GassetError::ConfigParse {
        path,
        source: Box::new(e),
    })
}

/// Round-trip `config` through the backend's own loader so it carries the
/// defaults the backend fills in.
pub async fn normalize_backend_config<B: Backend>(
    backend: &B,
    root: &Path,
    config: &BackendConfig,
) -> GassetResult<BackendConfig> {
    let mut scratch = tempfile::Builder::new()
        .prefix("gasset-backend-")
        .suffix(".json")
        .tempfile()
        .map_err(|source| GassetError::ConfigWrite {
            path: std::env::temp_dir(),
            source,
        })?;
    let data = serde_json::to_vec(config).map_err(|e| GassetError::ConfigParse {
        path: project_file(root),
        source: Box::new(e),
    })?;
    scratch
        .write_all(&data)
        .and_then(|()| scratch.flush())
        .map_err(|source| GassetError::ConfigWrite {
            path: scratch.path().to_path_buf(),
            source,
        })?;

    let normalized = backend
        .load_config(scratch.path())
        .await
        .map_err(|e| GassetError::ConfigParse {
            path: project_file(root),
            source: Box::new(e),
        })?;
    debug!(storage = %normalized.storage.kind, "backend config normalized");
    Ok(normalized)
}

/// Read-modify-write of the project file. Readers see either the old or the
/// new file, never a partial one.
pub fn update<F>(root: &Path, mutate: F) -> GassetResult<ProjectConfig>
where
    F: FnOnce(&mut ProjectConfig),
{
    let mut config = load(root)?;
    mutate(&mut config);
    write(root, &config)?;
    Ok(config)
}

/// Replace the project file with `config`.
pub fn write(root: &Path, config: &ProjectConfig) -> GassetResult<()> {
    let path = project_file(root);
    let write_error = |source: std::io::Error| GassetError::ConfigWrite {
        path: path.clone(),
        source,
    };
    let mut data = serde_json::to_vec_pretty(config).map_err(|e| write_error(e.into()))?;
    data.push(b'\n');

    let mut temp = tempfile::NamedTempFile::new_in(root).map_err(write_error)?;
    match fs::metadata(&path) {
        Ok(existing) => temp
            .as_file()
            .set_permissions(existing.permissions())
            .map_err(write_error)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_error(e)),
    }
    temp.write_all(&data).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(&path).map_err(|e| write_error(e.error))?;
    debug!(path = %path.display(), "project config written");
    Ok(())
}

/// Load the project file, normalize its backend config, resolve credentials
/// and attach the access keys.
pub async fn resolve<B: Backend>(root: &Path, backend: &B) -> GassetResult<ResolvedConfig> {
    let project = load(root)?;
    let normalized = normalize_backend_config(backend, root, &project.backend_config).await?;
    let credentials = secrets::resolve_credentials(root)?;
    let backend_config = normalized.with_access_keys(credentials.access_keys());
    Ok(ResolvedConfig {
        root: root.to_path_buf(),
        project,
        backend_config,
        credentials,
    })
}
