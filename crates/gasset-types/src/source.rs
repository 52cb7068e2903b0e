use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Key of one snapshot history: the machine, the account and the absolute
/// directory that was snapshotted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceInfo {
    pub host: String,
    #[serde(rename = "userName")]
    pub user: String,
    pub path: PathBuf,
}

impl SourceInfo {
    pub fn new(host: impl Into<String>, user: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable key used by backends to name per-source records on disk.
    pub fn storage_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.host.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.user.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.path.to_string_lossy().as_bytes());
        hex::encode(&hasher.finalize().as_bytes()[..16])
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let s = SourceInfo::new("host-pc", "user", "/work/assets");
        assert_eq!(s.to_string(), "user@host-pc:/work/assets");
    }

    #[test]
    fn storage_key_distinguishes_fields() {
        let a = SourceInfo::new("h", "u", "/a");
        let b = SourceInfo::new("h", "u", "/b");
        let c = SourceInfo::new("hu", "", "/a");
        assert_ne!(a.storage_key(), b.storage_key());
        assert_ne!(a.storage_key(), c.storage_key());
        assert_eq!(a.storage_key(), SourceInfo::new("h", "u", "/a").storage_key());
    }
}
