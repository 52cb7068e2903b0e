//! Connect-or-create state machine for the backend session.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use gasset_store::{Backend, BackendError, Repository, RepositoryWriter, Storage};
use gasset_types::{Policy, PolicyTarget, ProjectId};

use crate::config::{self, ResolvedConfig};
use crate::error::{GassetError, GassetResult};
use crate::session::finish_session;

/// Directory under the user config directory that holds connection files.
pub const CONNECTION_DIR: &str = "gasset";

/// `<config_dir>/gasset/connection-<id>.json`
pub fn connection_path(config_dir: &Path, id: &ProjectId) -> PathBuf {
    config_dir
        .join(CONNECTION_DIR)
        .join(format!("connection-{id}.json"))
}

/// The platform user config directory.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    Creating,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives a project from its resolved config to a connected repository.
///
/// With `create`, a new repository is initialized in empty storage, given a
/// fresh identity and the default policy, and only then is the identity
/// written to the project file. Without it, the persisted identity is used
/// to reconnect. Any failure moves the machine to [`BootstrapState::Failed`]
/// and is returned as is.
pub struct Bootstrapper<'a, B: Backend> {
    backend: &'a B,
    config: &'a ResolvedConfig,
    config_dir: PathBuf,
    rng: StdRng,
    state: BootstrapState,
}

impl<'a, B: Backend> Bootstrapper<'a, B> {
    pub fn new(backend: &'a B, config: &'a ResolvedConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            config,
            config_dir: config_dir.into(),
            rng: StdRng::from_entropy(),
            state: BootstrapState::Uninitialized,
        }
    }

    /// Use `rng` for identity generation.
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self { rng, ..self }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    fn transition(&mut self, next: BootstrapState) {
        debug!(from = %self.state, to = %next, "bootstrap transition");
        self.state = next;
    }

    fn settle<T>(&mut self, result: GassetResult<T>) -> GassetResult<T> {
        match &result {
            Ok(_) => self.transition(BootstrapState::Connected),
            Err(e) => {
                debug!(error = %e, "bootstrap failed");
                self.transition(BootstrapState::Failed);
            }
        }
        result
    }

    /// Create or reconnect, returning the project identity in use.
    pub async fn bootstrap(&mut self, create: bool) -> GassetResult<ProjectId> {
        let result = if create {
            self.transition(BootstrapState::Creating);
            self.create().await
        } else {
            self.transition(BootstrapState::Connecting);
            self.reconnect().await
        };
        self.settle(result)
    }

    /// Open the repository recorded for this project's identity.
    pub async fn open(&mut self) -> GassetResult<B::Repository> {
        self.transition(BootstrapState::Connecting);
        let result = self.open_repository().await;
        self.settle(result)
    }

    fn identity(&self) -> GassetResult<ProjectId> {
        match self.config.project.identity() {
            None => Err(GassetError::IdentityMissing),
            Some(Ok(id)) => Ok(id),
            Some(Err(e)) => Err(GassetError::ConfigParse {
                path: config::project_file(&self.config.root),
                source: Box::new(e),
            }),
        }
    }

    fn password(&self) -> &str {
        self.config.credentials.repo_password()
    }

    async fn storage(&self) -> GassetResult<B::Storage> {
        self.backend
            .new_storage(&self.config.backend_config)
            .await
            .map_err(GassetError::connect("building storage handle"))
    }

    async fn create(&mut self) -> GassetResult<ProjectId> {
        let storage = self.storage().await?;
        let probe = storage
            .list_blobs("", Some(1))
            .await
            .map_err(GassetError::connect("probing storage"))?;
        if !probe.is_empty() {
            let storage = &self.config.backend_config.storage;
            return Err(GassetError::AlreadyInitialized {
                location: format!("{} {}", storage.kind, storage.config),
            });
        }

        self.backend
            .initialize(&storage, self.password())
            .await
            .map_err(GassetError::BackendInit)?;

        let id = ProjectId::generate(&mut self.rng);
        let path = connection_path(&self.config_dir, &id);
        self.backend
            .connect(
                &path,
                &storage,
                self.password(),
                &self.config.backend_config.client_options,
            )
            .await
            .map_err(GassetError::connect(format!("writing {}", path.display())))?;

        self.apply_default_policy(&path).await?;

        config::update(&self.config.root, |c| c.durable_identity = id.to_string())?;
        info!(identity = %id, "repository created");
        Ok(id)
    }

    async fn apply_default_policy(&self, connection: &Path) -> GassetResult<()> {
        let target = PolicyTarget::Global;
        let policy_error = |source: BackendError| GassetError::Policy {
            target: target.to_string(),
            source,
        };
        let repo = self
            .backend
            .open(connection, self.password())
            .await
            .map_err(GassetError::connect(format!("opening {}", connection.display())))?;

        let result = async {
            let writer = repo
                .new_writer("apply default policy")
                .await
                .map_err(policy_error)?;
            writer
                .set_policy(&target, &Policy::default_baseline())
                .await
                .map_err(policy_error)?;
            writer.flush().await.map_err(policy_error)
        }
        .await;
        finish_session(&repo, result).await
    }

    async fn reconnect(&mut self) -> GassetResult<ProjectId> {
        let id = self.identity()?;
        let storage = self.storage().await?;
        let path = connection_path(&self.config_dir, &id);
        self.backend
            .connect(
                &path,
                &storage,
                self.password(),
                &self.config.backend_config.client_options,
            )
            .await
            .map_err(GassetError::connect(format!("writing {}", path.display())))?;
        info!(identity = %id, "connected to repository");
        Ok(id)
    }

    async fn open_repository(&mut self) -> GassetResult<B::Repository> {
        let id = self.identity()?;
        let path = connection_path(&self.config_dir, &id);
        self.backend
            .open(&path, self.password())
            .await
            .map_err(GassetError::connect(format!("opening {}", path.display())))
    }
}
