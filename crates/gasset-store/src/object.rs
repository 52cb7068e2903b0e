use serde::{Deserialize, Serialize};

use gasset_types::{Compressor, EntryKind, ObjectId};

use crate::error::{BackendError, BackendResult};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a file and a tree with identical bytes get different ids.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for file contents.
    pub const BLOB: Self = Self {
        domain: "gasset-blob-v1",
    };
    /// Hasher for directory listings.
    pub const TREE: Self = Self {
        domain: "gasset-tree-v1",
    };

    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }
}

const RAW: u8 = 0;
const ZSTD: u8 = 1;
const ZSTD_LEVEL: i32 = 3;

/// Storage name of an object: `objects/<first byte hex>/<full hex>`.
pub fn object_blob_id(id: &ObjectId) -> String {
    let hex = id.to_hex();
    format!("objects/{}/{}", &hex[..2], hex)
}

/// Encode object bytes for storage: one header byte naming the codec, then
/// the payload.
pub fn encode(data: &[u8], compressor: Compressor) -> BackendResult<Vec<u8>> {
    match compressor {
        Compressor::None => {
            let mut out = Vec::with_capacity(data.len() + 1);
            out.push(RAW);
            out.extend_from_slice(data);
            Ok(out)
        }
        Compressor::Zstd => {
            let compressed = zstd::encode_all(data, ZSTD_LEVEL)?;
            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(ZSTD);
            out.extend_from_slice(&compressed);
            Ok(out)
        }
    }
}

pub fn decode(stored: &[u8]) -> BackendResult<Vec<u8>> {
    match stored.split_first() {
        Some((&RAW, payload)) => Ok(payload.to_vec()),
        Some((&ZSTD, payload)) => Ok(zstd::decode_all(payload)?),
        Some((codec, _)) => Err(BackendError::Corrupt {
            what: "object".into(),
            reason: format!("unknown codec byte {codec}"),
        }),
        None => Err(BackendError::Corrupt {
            what: "object".into(),
            reason: "empty object".into(),
        }),
    }
}

/// One named entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub object: ObjectId,
    /// File size in bytes; zero for directories.
    pub size: u64,
    /// Modification time as nanoseconds since the UNIX epoch.
    pub modified_ns: u64,
}

/// Directory listing object. Entries are kept sorted by name so the same
/// directory contents always hash to the same id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    pub fn to_bytes(&self) -> BackendResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> BackendResult<Self> {
        serde_json::from_slice(data).map_err(|e| BackendError::Corrupt {
            what: "tree".into(),
            reason: e.to_string(),
        })
    }

    pub fn compute_id(&self) -> BackendResult<ObjectId> {
        Ok(ContentHasher::TREE.hash(&self.to_bytes()?))
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}
