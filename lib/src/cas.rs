//! Content-addressable object store (spec.md §4.2).
//!
//! Objects live under `objects/<2 hex>/<rest hex>`, mirroring the loose-object
//! layout the teacher's backends use. Writes go through a temp file in the
//! same directory, `fsync`ed, then renamed into place
//! ([`file_util::persist_content_addressed_temp_file`]) so a crash never
//! leaves a half-written object visible under its final name (H1).

use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::instrument;

use crate::backend::BackendError;
use crate::backend::StoredObject;
use crate::codec;
use crate::file_util;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::object_id::ObjectId;

#[derive(Debug, Error)]
pub enum CasError {
    #[error(transparent)]
    Io(#[from] PathError),
    #[error("object {hash} not found")]
    NotFound { hash: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type CasResult<T> = Result<T, CasError>;

pub struct Cas {
    objects_dir: PathBuf,
}

impl Cas {
    /// Creates the `objects/` directory under `root` if it doesn't exist yet.
    pub fn init(root: &Path) -> io::Result<Self> {
        let objects_dir = root.join("objects");
        file_util::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    pub fn open(root: &Path) -> Self {
        Self {
            objects_dir: root.join("objects"),
        }
    }

    fn object_path(&self, hash_hex: &str) -> PathBuf {
        let (prefix, rest) = hash_hex.split_at(2);
        self.objects_dir.join(prefix).join(rest)
    }

    pub fn has_raw(&self, hash_hex: &str) -> bool {
        self.object_path(hash_hex).is_file()
    }

    #[instrument(skip(self))]
    pub fn read_raw(&self, hash_hex: &str) -> CasResult<Vec<u8>> {
        let path = self.object_path(hash_hex);
        std::fs::read(&path).context(&path).map_err(|e| {
            if e.source.kind() == io::ErrorKind::NotFound {
                CasError::NotFound {
                    hash: hash_hex.to_owned(),
                }
            } else {
                CasError::Io(e)
            }
        })
    }

    /// Writes already-encoded, tagged bytes under their content hash.
    /// Idempotent: writing the same bytes twice is a no-op the second time,
    /// since the destination path is identical (H1).
    #[instrument(skip(self, stored))]
    pub fn write_raw(&self, stored: &[u8]) -> CasResult<String> {
        let hash_hex = codec::format_hash(&codec::hash_stored_bytes(stored));
        let path = self.object_path(&hash_hex);
        if path.is_file() {
            tracing::debug!(hash = %hash_hex, "object already present");
            return Ok(hash_hex);
        }
        let dir = path.parent().unwrap();
        file_util::create_or_reuse_dir(dir).context(dir)?;
        let mut temp_file = NamedTempFile::new_in(dir).context(dir)?;
        {
            use std::io::Write as _;
            temp_file.write_all(stored).context(&path)?;
        }
        file_util::persist_content_addressed_temp_file(temp_file, &path).context(&path)?;
        Ok(hash_hex)
    }

    pub fn put<T: StoredObject>(&self, obj: &T) -> CasResult<T::Id> {
        let stored = obj.encode();
        let hash_hex = self.write_raw(&stored)?;
        Ok(T::Id::try_from_hex(&hash_hex).expect("hash formatted as valid hex"))
    }

    pub fn get<T: StoredObject>(&self, id: &T::Id) -> CasResult<T> {
        let stored = self.read_raw(&id.hex())?;
        Ok(T::decode(&stored)?)
    }

    /// Lists every object hash currently stored. Used by `purge` to compute
    /// the unreachable set.
    pub fn iter_all_hashes(&self) -> CasResult<Vec<String>> {
        let mut out = Vec::new();
        if !self.objects_dir.is_dir() {
            return Ok(out);
        }
        for prefix_entry in std::fs::read_dir(&self.objects_dir).context(&self.objects_dir)? {
            let prefix_entry = prefix_entry.context(&self.objects_dir)?;
            let prefix_path = prefix_entry.path();
            if !prefix_path.is_dir() {
                continue;
            }
            let prefix = prefix_path.file_name().unwrap().to_string_lossy().into_owned();
            for rest_entry in std::fs::read_dir(&prefix_path).context(&prefix_path)? {
                let rest_entry = rest_entry.context(&prefix_path)?;
                let rest = rest_entry.file_name().to_string_lossy().into_owned();
                out.push(format!("{prefix}{rest}"));
            }
        }
        Ok(out)
    }

    /// Deletes an object by hash. Only ever called by `purge` after a
    /// reachability sweep.
    pub fn remove_raw(&self, hash_hex: &str) -> CasResult<()> {
        let path = self.object_path(hash_hex);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CasError::Io(PathError { path, source: e })),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::backend::Tree;

    #[test]
    fn put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let tree = Tree::default();
        let id = cas.put(&tree).unwrap();
        assert_eq!(cas.get::<Tree>(&id).unwrap(), tree);
    }

    #[test]
    fn write_raw_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let stored = codec::encode("tree", &Tree::default());
        let h1 = cas.write_raw(&stored).unwrap();
        let h2 = cas.write_raw(&stored).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        assert!(matches!(
            cas.read_raw("00".repeat(32).as_str()),
            Err(CasError::NotFound { .. })
        ));
    }

    #[test]
    fn iter_all_hashes_lists_written_objects() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let id = cas.put(&Tree::default()).unwrap();
        assert_eq!(cas.iter_all_hashes().unwrap(), vec![id.hex()]);
    }
}
