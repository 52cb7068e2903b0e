//! Orchestration core for gasset.
//!
//! gasset snapshots the asset directories of a git project into a
//! content-addressed backup repository. This crate holds everything between
//! the command line and the backend:
//!
//! - [`locator`] -- find the project root from any directory inside it
//! - [`config`] / [`secrets`] -- the `.gasset` project file and `.env` credentials
//! - [`bootstrap`] -- create a repository, or reconnect to an existing one
//! - [`selector`] -- pick the manifests an incremental upload diffs against
//! - [`committer`] -- save or skip an uploaded snapshot and apply retention
//! - [`snapshot`] -- run every declared source inside one session
//!
//! The backend is reached only through the `gasset_store` traits.

pub mod bootstrap;
pub mod committer;
pub mod config;
pub mod error;
pub mod locator;
pub mod secrets;
pub mod selector;
pub mod session;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{connection_path, default_config_dir, BootstrapState, Bootstrapper};
pub use committer::{commit, snapshot_source, Outcome};
pub use config::{ProjectConfig, ResolvedConfig, PROJECT_FILE};
pub use error::{GassetError, GassetResult};
pub use locator::locate;
pub use secrets::{resolve_credentials, Credentials, SECRETS_FILE};
pub use selector::{find_previous, select_previous, select_previous_by_id};
pub use snapshot::{snapshot_sources, SourceReport};
