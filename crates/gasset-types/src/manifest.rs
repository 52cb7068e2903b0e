use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::object::ObjectId;
use crate::source::SourceInfo;

/// Identifier of a saved snapshot manifest.
///
/// UUID v7, so identifiers sort by creation time. That makes the id a usable
/// secondary ordering key when two manifests share a start time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(Uuid);

impl ManifestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ManifestId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ManifestId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidManifestId(e.to_string()))
    }
}

impl fmt::Debug for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManifestId({})", self.0)
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of the entry a snapshot root points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Aggregate counters recorded by the uploader.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySummary {
    pub total_file_size: u64,
    pub total_file_count: u64,
    pub total_dir_count: u64,
    /// Files that were read from the previous snapshot instead of hashed.
    pub cached_file_count: u64,
    pub ignored_error_count: u64,
}

/// Reference to the content root of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootEntry {
    pub kind: EntryKind,
    pub object: ObjectId,
    #[serde(default)]
    pub summary: DirectorySummary,
}

impl RootEntry {
    pub fn directory(object: ObjectId) -> Self {
        Self {
            kind: EntryKind::Directory,
            object,
            summary: DirectorySummary::default(),
        }
    }
}

/// Recorded result of one snapshot attempt for a source.
///
/// A manifest is never mutated after it has been saved. The builder-style
/// methods below consume the value and return a new one; they exist for the
/// uploader and for tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotManifest {
    pub id: ManifestId,
    pub source: SourceInfo,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Empty for a complete snapshot.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub incomplete_reason: String,
    pub root_entry: RootEntry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retention_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl SnapshotManifest {
    /// A complete manifest that started and ended at `start_time`.
    pub fn new(source: SourceInfo, start_time: DateTime<Utc>, root: ObjectId) -> Self {
        Self {
            id: ManifestId::new(),
            source,
            description: String::new(),
            start_time,
            end_time: start_time,
            incomplete_reason: String::new(),
            root_entry: RootEntry::directory(root),
            retention_reasons: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_id(self, id: ManifestId) -> Self {
        Self { id, ..self }
    }

    pub fn with_end_time(self, end_time: DateTime<Utc>) -> Self {
        Self { end_time, ..self }
    }

    pub fn with_incomplete_reason(self, reason: impl Into<String>) -> Self {
        Self {
            incomplete_reason: reason.into(),
            ..self
        }
    }

    pub fn with_summary(self, summary: DirectorySummary) -> Self {
        Self {
            root_entry: RootEntry {
                summary,
                ..self.root_entry
            },
            ..self
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_retention_reasons(self, retention_reasons: Vec<String>) -> Self {
        Self {
            retention_reasons,
            ..self
        }
    }

    /// The same manifest with description and tags cleared.
    pub fn without_annotations(self) -> Self {
        Self {
            description: String::new(),
            tags: BTreeMap::new(),
            ..self
        }
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete_reason.is_empty()
    }

    pub fn root_object(&self) -> ObjectId {
        self.root_entry.object
    }
}
