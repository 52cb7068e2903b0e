use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};
use crate::storage::FsStorage;

/// Name of the blob that marks a storage directory as a repository.
pub const FORMAT_BLOB_ID: &str = "gasset.repository";

const FORMAT_VERSION: u32 = 1;
const VERIFIER_CONTEXT: &str = "gasset 2024 repository password verifier";

/// Repository header written once by `initialize`.
///
/// Holds a salted BLAKE3 verifier of the password rather than the password,
/// so the storage location alone does not reveal it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFormat {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub salt: String,
    pub password_verifier: String,
}

impl RepositoryFormat {
    pub fn create(password: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let verifier = derive_verifier(&salt, password);
        Self {
            version: FORMAT_VERSION,
            created_at: Utc::now(),
            salt: hex::encode(salt),
            password_verifier: verifier.to_hex().to_string(),
        }
    }

    pub fn verify_password(&self, password: &str) -> BackendResult<()> {
        let salt = hex::decode(&self.salt).map_err(|e| BackendError::Corrupt {
            what: "repository format".into(),
            reason: format!("bad salt: {e}"),
        })?;
        let expected = blake3::Hash::from_hex(&self.password_verifier).map_err(|e| {
            BackendError::Corrupt {
                what: "repository format".into(),
                reason: format!("bad verifier: {e}"),
            }
        })?;
        // blake3::Hash equality is constant-time.
        if derive_verifier(&salt, password) == expected {
            Ok(())
        } else {
            Err(BackendError::InvalidPassword)
        }
    }

    pub fn read(storage: &FsStorage) -> BackendResult<Option<Self>> {
        let Some(data) = storage.get_blob(FORMAT_BLOB_ID)? else {
            return Ok(None);
        };
        let format: Self = serde_json::from_slice(&data).map_err(|e| BackendError::Corrupt {
            what: "repository format".into(),
            reason: e.to_string(),
        })?;
        if format.version != FORMAT_VERSION {
            return Err(BackendError::Corrupt {
                what: "repository format".into(),
                reason: format!("unsupported version {}", format.version),
            });
        }
        Ok(Some(format))
    }

    /// Read the header and check `password` against it.
    pub fn read_and_verify(storage: &FsStorage, password: &str) -> BackendResult<Self> {
        let format = Self::read(storage)?.ok_or_else(|| {
            BackendError::NotFound(format!(
                "no repository in {}",
                storage.root().display()
            ))
        })?;
        format.verify_password(password)?;
        Ok(format)
    }

    pub fn write(&self, storage: &FsStorage) -> BackendResult<()> {
        storage.put_blob(FORMAT_BLOB_ID, &serde_json::to_vec_pretty(self)?)
    }
}

fn derive_verifier(salt: &[u8], password: &str) -> blake3::Hash {
    let mut material = Vec::with_capacity(salt.len() + password.len());
    material.extend_from_slice(salt);
    material.extend_from_slice(password.as_bytes());
    blake3::Hash::from(blake3::derive_key(VERIFIER_CONTEXT, &material))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_password() {
        let format = RepositoryFormat::create("password");
        assert!(format.verify_password("password").is_ok());
        assert!(matches!(
            format.verify_password("wrong"),
            Err(BackendError::InvalidPassword)
        ));
    }

    #[test]
    fn salt_differs_per_repository() {
        let a = RepositoryFormat::create("password");
        let b = RepositoryFormat::create("password");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_verifier, b.password_verifier);
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(dir.path()).unwrap();
        assert!(RepositoryFormat::read(&storage).unwrap().is_none());
        let format = RepositoryFormat::create("pw");
        format.write(&storage).unwrap();
        assert_eq!(RepositoryFormat::read(&storage).unwrap(), Some(format));
        assert!(RepositoryFormat::read_and_verify(&storage, "pw").is_ok());
    }
}
