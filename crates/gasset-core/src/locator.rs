//! Project root discovery.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GassetError, GassetResult};

/// Name of the marker that identifies a git working tree.
pub const GIT_MARKER: &str = ".git";

/// Find the nearest directory at or above `start` that contains a `.git`
/// entry.
///
/// Both a `.git` directory and a `.git` file (linked worktree, submodule)
/// count. A relative `start` is resolved against the working directory.
pub fn locate(start: &Path) -> GassetResult<PathBuf> {
    let not_found = || GassetError::NotAGitRepository {
        start: start.to_path_buf(),
    };
    let mut dir = std::path::absolute(start).map_err(|_| not_found())?;
    let mut visited = HashSet::new();

    loop {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        if !visited.insert(key) {
            debug!(dir = %dir.display(), "directory revisited while locating project root");
            return Err(not_found());
        }
        if dir.join(GIT_MARKER).symlink_metadata().is_ok() {
            debug!(root = %dir.display(), "project root located");
            return Ok(dir);
        }
        match dir.parent() {
            Some(parent) if parent != dir => dir = parent.to_path_buf(),
            _ => return Err(not_found()),
        }
    }
}
