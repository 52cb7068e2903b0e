//! Snapshot runner: one session, every declared source.

use std::path::{Path, PathBuf};

use gasset_store::{Backend, Repository, RepositoryWriter};
use gasset_types::SourceInfo;
use tracing::{debug, info};

use crate::bootstrap::Bootstrapper;
use crate::committer::{snapshot_source, Outcome};
use crate::config::ResolvedConfig;
use crate::error::{GassetError, GassetResult};
use crate::session::finish_session;

/// Result for one source directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceReport {
    pub source: SourceInfo,
    pub outcome: Outcome,
}

/// Snapshot each of `directories` (relative to `root`) inside one write
/// session on `repo`.
///
/// Stops at the first failing source; nothing from the session is flushed
/// in that case. The repository is closed on every path.
pub async fn snapshot_sources<R: Repository>(
    repo: &R,
    root: &Path,
    directories: &[PathBuf],
) -> GassetResult<Vec<SourceReport>> {
    let result = run_sources(repo, root, directories).await;
    finish_session(repo, result).await
}

async fn run_sources<R: Repository>(
    repo: &R,
    root: &Path,
    directories: &[PathBuf],
) -> GassetResult<Vec<SourceReport>> {
    let writer = repo
        .new_writer("snapshot")
        .await
        .map_err(GassetError::connect("opening write session"))?;
    let options = repo.client_options();

    let mut reports = Vec::with_capacity(directories.len());
    for dir in directories {
        let path = root.join(dir);
        let source = SourceInfo::new(&options.hostname, &options.username, &path);
        debug!(source = %source, "snapshotting source");
        let outcome = snapshot_source(&writer, &source, &path).await?;
        reports.push(SourceReport { source, outcome });
    }

    writer.flush().await.map_err(|e| GassetError::Save {
        path: root.to_path_buf(),
        source: e,
    })?;
    info!(sources = reports.len(), "snapshots committed");
    Ok(reports)
}

/// Open the project's repository and snapshot every declared source.
pub async fn run<B: Backend>(
    backend: &B,
    config: &ResolvedConfig,
    config_dir: &Path,
) -> GassetResult<Vec<SourceReport>> {
    let repo = Bootstrapper::new(backend, config, config_dir).open().await?;
    snapshot_sources(&repo, &config.root, &config.project.source_directories).await
}
