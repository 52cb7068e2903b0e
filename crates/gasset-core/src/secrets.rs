//! Credentials from the project's `.env` file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use gasset_types::AccessKeys;
use tracing::debug;

use crate::error::{GassetError, GassetResult};

pub const SECRETS_FILE: &str = ".env";

pub const ACCESS_ID: &str = "ACCESS_ID";
pub const ACCESS_SECRET: &str = "ACCESS_SECRET";
pub const REPO_PASSWORD: &str = "REPO_PASSWORD";

/// Backend credentials and the repository password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_id: String,
    access_secret: String,
    repo_password: String,
}

impl Credentials {
    pub fn new(
        access_id: impl Into<String>,
        access_secret: impl Into<String>,
        repo_password: impl Into<String>,
    ) -> Self {
        Self {
            access_id: access_id.into(),
            access_secret: access_secret.into(),
            repo_password: repo_password.into(),
        }
    }

    pub fn access_keys(&self) -> AccessKeys {
        AccessKeys {
            access_id: self.access_id.clone(),
            access_secret: self.access_secret.clone(),
        }
    }

    pub fn repo_password(&self) -> &str {
        &self.repo_password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &"<redacted>")
            .field("access_secret", &"<redacted>")
            .field("repo_password", &"<redacted>")
            .finish()
    }
}

pub fn secrets_file(root: &Path) -> PathBuf {
    root.join(SECRETS_FILE)
}

/// Load credentials from `<root>/.env`, letting process environment
/// variables of the same name take precedence.
pub fn resolve_credentials(root: &Path) -> GassetResult<Credentials> {
    resolve_credentials_with(root, |key| std::env::var(key).ok())
}

/// Like [`resolve_credentials`], reading overrides from `env` instead of the
/// process environment. The environment is never modified.
pub fn resolve_credentials_with<F>(root: &Path, env: F) -> GassetResult<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let path = secrets_file(root);
    let load_error = |source: dotenvy::Error| GassetError::SecretsLoad {
        path: path.clone(),
        reason: source.to_string(),
        source: Some(source),
    };

    let mut values = HashMap::new();
    for item in dotenvy::from_path_iter(&path).map_err(load_error)? {
        let (key, value) = item.map_err(load_error)?;
        values.insert(key, value);
    }

    let lookup = |key: &str| -> GassetResult<String> {
        if let Some(value) = env(key) {
            debug!(key, "secret taken from process environment");
            return Ok(value);
        }
        values.get(key).cloned().ok_or_else(|| GassetError::SecretsLoad {
            path: path.clone(),
            reason: format!("{key} is not set"),
            source: None,
        })
    };

    Ok(Credentials {
        access_id: lookup(ACCESS_ID)?,
        access_secret: lookup(ACCESS_SECRET)?,
        repo_password: lookup(REPO_PASSWORD)?,
    })
}
