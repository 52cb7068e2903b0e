use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend connection settings as stored in the `backendConfig` section of
/// the project file.
///
/// The storage section is interpreted only by the backend that owns the
/// storage `type`. Keys this struct does not model are kept in `extra` and
/// written back unchanged. Access keys are attached at runtime and are never
/// serialized, so they cannot leak back into the project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub storage: StorageConfig,
    #[serde(default, skip_serializing_if = "ClientOptions::is_unset")]
    pub client_options: ClientOptions,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub access_keys: Option<AccessKeys>,
}

impl BackendConfig {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            client_options: ClientOptions::default(),
            extra: Map::new(),
            access_keys: None,
        }
    }

    pub fn with_client_options(self, client_options: ClientOptions) -> Self {
        Self {
            client_options,
            ..self
        }
    }

    pub fn with_access_keys(self, access_keys: AccessKeys) -> Self {
        Self {
            access_keys: Some(access_keys),
            ..self
        }
    }
}

/// Storage location: a backend-specific `type` tag and its settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl StorageConfig {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

/// Per-client settings recorded alongside a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub read_only: bool,
}

impl ClientOptions {
    pub fn is_unset(&self) -> bool {
        self == &Self::default()
    }
}

/// Storage access keys resolved from the secrets file.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeys {
    pub access_id: String,
    pub access_secret: String,
}

impl fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeys")
            .field("access_id", &"<redacted>")
            .field("access_secret", &"<redacted>")
            .finish()
    }
}
