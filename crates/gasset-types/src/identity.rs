use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of a freshly generated [`ProjectId`].
pub const PROJECT_ID_LENGTH: usize = 8;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Durable identity of a project's backend-side configuration.
///
/// Generated once, right after the backend repository is created, and then
/// persisted in the project file. It keys the per-machine connection file, so
/// it must never be regenerated while the repository it names is valid.
///
/// The identity is not a secret and collisions are not guarded against.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Generate a new random identity of [`PROJECT_ID_LENGTH`] characters.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::generate_with_length(rng, PROJECT_ID_LENGTH)
    }

    /// Generate a random alphanumeric identity of `len` characters.
    pub fn generate_with_length<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let id = (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Parse an identity read back from the project file.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        if value.is_empty() {
            return Err(TypeError::InvalidProjectId {
                value: value.into(),
                reason: "identity is empty".into(),
            });
        }
        if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidProjectId {
                value: value.into(),
                reason: "identity must be alphanumeric".into(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({})", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
