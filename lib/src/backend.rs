//! The CAS object kinds (spec.md §3) and the tagged encoding that ties each
//! one to its [`crate::codec`] wire form.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::codec;
use crate::codec::CodecError;
use crate::object_id::ActionId;
use crate::object_id::BlobId;
use crate::object_id::BranchId;
use crate::object_id::ChangelogId;
use crate::object_id::CommitId;
use crate::object_id::FileId;
use crate::object_id::ManifestId;
use crate::object_id::ObjectId as _;
use crate::object_id::RedoNodeId;
use crate::object_id::RegistryId;
use crate::object_id::SessionId;
use crate::object_id::SettingsId;
use crate::object_id::StashId;
use crate::object_id::TreeId;
use crate::uuid_util::Uuid;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("object {hash} is corrupt")]
    CorruptObject {
        hash: String,
        #[source]
        source: CodecError,
    },
    #[error("object {hash} has a malformed blob body")]
    MalformedBlob { hash: String },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A property value attached to a file or tree entry (spec.md §3: "string→
/// value mapping").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

pub type Properties = BTreeMap<String, PropValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    EmptyDir,
    Link,
}

/// Opaque file contents, content-addressed directly over the raw bytes.
/// Bodies at or under [`codec::RAW_BLOB_THRESHOLD`] are embedded as base64
/// in the header; larger ones are written as a raw tail (spec.md §4.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub contents: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct BlobHeaderInline {
    inline: String,
}

#[derive(Serialize, Deserialize)]
struct BlobHeaderRaw {
    raw_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub blob: BlobId,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub kind: EntryKind,
    pub target: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

/// Ordered mapping `name -> (kind, target_hash, properties)` (spec.md §3).
/// `BTreeMap` keeps entries sorted by name, which is also what canonical
/// encoding requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: BTreeMap<String, TreeEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Normal,
    Amend,
    Apply,
    Replay,
    Append,
    Init,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub parent: Option<CommitId>,
    pub root_tree: TreeId,
    pub author_uuid: Uuid,
    pub timestamp_applied: i64,
    pub timestamp_written: i64,
    pub message: String,
    pub changelog_entry: ChangelogId,
    pub kind: CommitKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOpKind {
    Added,
    Removed,
    Modified,
    PropsChanged,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOp {
    pub path: String,
    pub kind: ChangeOpKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub prev: Option<ChangelogId>,
    pub ops: Vec<ChangeOp>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub head_commit: CommitId,
    pub base_commit: CommitId,
    pub upstream_branch_uuid: Option<Uuid>,
    pub uuid: Uuid,
    pub sealed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Attached,
    Detached,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uuid: Uuid,
    pub branch_uuid: Uuid,
    pub head_commit: CommitId,
    pub prepared_commit: Option<CommitId>,
    /// The session's current working-copy tracking state (spec.md §3's
    /// `Manifest`). Not named in spec.md's `Session` tuple, which otherwise
    /// has nowhere for per-session uncommitted tracking state to live
    /// between commands; see DESIGN.md.
    pub manifest: ManifestId,
    pub prefix: String,
    pub mode: SessionMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Added,
    Modified,
    Deleted,
    Tracked,
    IgnoredByRule,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: EntryKind,
    pub hash: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    pub status: TrackStatus,
    pub mtime: Option<i64>,
    pub size: Option<u64>,
}

/// Snapshot of the working copy's tracked state (spec.md §3). Distinct from
/// [`Tree`] because it also records per-path tracking bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashEntry {
    pub session_uuid: Uuid,
    pub manifest: ManifestId,
    pub unsaved_blobs: Vec<FileId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorsTable {
    pub authors: BTreeMap<String, AuthorInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub include_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub author_uuid: Uuid,
    pub authors_table_hash: Option<String>,
    pub features: Vec<String>,
}

/// A recorded `(command, args)` pair, used both for an action's canonical
/// arguments and for a logical inverse (spec.md §4.5).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalOp {
    pub command: String,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
}

impl LogicalOp {
    pub fn physical() -> Self {
        Self {
            command: "__physical__".into(),
            args: BTreeMap::new(),
        }
    }

    pub fn is_physical(&self) -> bool {
        self.command == "__physical__"
    }
}

/// One of the argument shapes spec.md §6 allows on the command surface:
/// a boolean flag, a single value, or a repeatable value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Single(String),
    Repeated(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerDelta {
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub prev: Option<ActionId>,
    pub command: String,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
    pub physical: BTreeMap<String, PointerDelta>,
    pub inverse: LogicalOp,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedoAlternative {
    pub label: String,
    pub node: RedoNodeId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum RedoNode {
    Entry {
        action: ActionId,
        /// The action-log head this entry cleanly replays onto. If the
        /// current head no longer matches, the entry is stale and redo must
        /// replay `command(args)` instead of forward-swapping pointers (see
        /// DESIGN.md's note on redo branching).
        based_on: Option<ActionId>,
        prior: Option<RedoNodeId>,
    },
    Fork {
        alternatives: Vec<RedoAlternative>,
    },
}

/// Maps live branch/session uuids (as hex strings, the only key type JSON
/// maps support) to their current CAS revision. See SPEC_FULL.md §5;
/// grounded on the teacher's `View`/`Operation` split.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub branches: BTreeMap<String, BranchId>,
    pub sessions: BTreeMap<String, SessionId>,
}

macro_rules! object_kind {
    ($ty:ty, $id:ty, $tag:literal) => {
        impl StoredObject for $ty {
            type Id = $id;
            const KIND: &'static str = $tag;
        }
    };
}

/// A type that can be written to and read from the CAS under its own kind
/// tag (spec.md §4.1: "each object carries a `kind` tag at offset 0").
pub trait StoredObject: Serialize + for<'de> Deserialize<'de> + Sized {
    type Id: crate::object_id::ObjectId + Debug;
    const KIND: &'static str;

    fn encode(&self) -> Vec<u8> {
        codec::encode(Self::KIND, self)
    }

    fn id_from_stored(stored: &[u8]) -> Self::Id {
        Self::Id::from_bytes(&codec::hash_stored_bytes(stored))
    }

    fn decode(stored: &[u8]) -> BackendResult<Self> {
        let raw = codec::decode_raw(stored).map_err(|source| BackendError::CorruptObject {
            hash: codec::format_hash(&codec::hash_stored_bytes(stored)),
            source,
        })?;
        codec::decode_typed(&raw, Self::KIND).map_err(|source| BackendError::CorruptObject {
            hash: codec::format_hash(&codec::hash_stored_bytes(stored)),
            source,
        })
    }
}

object_kind!(File, FileId, "file");
object_kind!(Tree, TreeId, "tree");
object_kind!(Commit, CommitId, "commit");
object_kind!(ChangelogEntry, ChangelogId, "changelog");
object_kind!(Branch, BranchId, "branch");
object_kind!(Session, SessionId, "session");
object_kind!(Manifest, ManifestId, "manifest");
object_kind!(StashEntry, StashId, "stash");
object_kind!(Settings, SettingsId, "settings");
object_kind!(AuthorsTable, crate::object_id::BlobId, "authors_table");
object_kind!(ActionRecord, ActionId, "action");
object_kind!(RedoNode, RedoNodeId, "redo_node");
object_kind!(Registry, RegistryId, "registry");

pub const BLOB_KIND: &str = "blob";

/// Encodes a blob body, choosing the inline-vs-raw-tail representation
/// based on [`codec::RAW_BLOB_THRESHOLD`].
pub fn encode_blob(contents: &[u8]) -> Vec<u8> {
    if contents.len() <= codec::RAW_BLOB_THRESHOLD {
        codec::encode(
            BLOB_KIND,
            &BlobHeaderInline {
                inline: base64_lite::encode(contents),
            },
        )
    } else {
        codec::encode_with_tail(
            BLOB_KIND,
            &BlobHeaderRaw {
                raw_len: contents.len(),
            },
            Some(contents),
        )
    }
}

pub fn decode_blob(stored: &[u8]) -> BackendResult<Blob> {
    let to_corrupt = |source: CodecError| BackendError::CorruptObject {
        hash: codec::format_hash(&codec::hash_stored_bytes(stored)),
        source,
    };
    let raw = codec::decode_raw(stored).map_err(to_corrupt)?;
    if raw.kind != BLOB_KIND {
        return Err(to_corrupt(CodecError::UnknownKind(raw.kind)));
    }
    if let Some(tail) = raw.tail {
        Ok(Blob { contents: tail })
    } else {
        let header: BlobHeaderInline =
            serde_json::from_value(raw.header).map_err(|e| to_corrupt(CodecError::SchemaMismatch(e)))?;
        let contents = base64_lite::decode(&header.inline).ok_or_else(|| BackendError::MalformedBlob {
            hash: codec::format_hash(&codec::hash_stored_bytes(stored)),
        })?;
        Ok(Blob { contents })
    }
}

/// A dependency-free base64 codec (standard alphabet, padded). Inlined
/// rather than pulling in a crate solely to embed blob bytes in a JSON
/// string.
mod base64_lite {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    pub fn encode(data: &[u8]) -> String {
        let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
        for chunk in data.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
            out.push(ALPHABET[((n >> 18) & 0x3f) as usize] as char);
            out.push(ALPHABET[((n >> 12) & 0x3f) as usize] as char);
            out.push(if chunk.len() > 1 {
                ALPHABET[((n >> 6) & 0x3f) as usize] as char
            } else {
                '='
            });
            out.push(if chunk.len() > 2 {
                ALPHABET[(n & 0x3f) as usize] as char
            } else {
                '='
            });
        }
        out
    }

    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some(u32::from(c - b'A')),
            b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        let bytes = s.as_bytes();
        if bytes.len() % 4 != 0 {
            return None;
        }
        let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
        for chunk in bytes.chunks(4) {
            let pad = chunk.iter().filter(|&&c| c == b'=').count();
            let mut n = 0u32;
            for &c in chunk {
                n <<= 6;
                if c != b'=' {
                    n |= value(c)?;
                }
            }
            out.push((n >> 16) as u8);
            if pad < 2 {
                out.push((n >> 8) as u8);
            }
            if pad < 1 {
                out.push(n as u8);
            }
        }
        Some(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn roundtrip() {
            for input in [&b""[..], b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar"] {
                assert_eq!(decode(&encode(input)).unwrap(), input);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip_small() {
        let stored = encode_blob(b"hello world");
        let blob = decode_blob(&stored).unwrap();
        assert_eq!(blob.contents, b"hello world");
    }

    #[test]
    fn blob_roundtrip_large_uses_raw_tail() {
        let contents = vec![7u8; codec::RAW_BLOB_THRESHOLD + 1];
        let stored = encode_blob(&contents);
        let blob = decode_blob(&stored).unwrap();
        assert_eq!(blob.contents, contents);
    }

    #[test]
    fn tree_roundtrips() {
        let mut tree = Tree::default();
        tree.entries.insert(
            "a.py".into(),
            TreeEntry {
                kind: EntryKind::File,
                target: Some("abc123".into()),
                properties: Properties::new(),
            },
        );
        let stored = tree.encode();
        let decoded = Tree::decode(&stored).unwrap();
        assert_eq!(decoded, tree);
    }
}
