//! The scratch store: a small set of named, mutable pointers living outside
//! the CAS (spec.md §3 — `action_log_head_hash`, `redo_stack_head_hash`,
//! `settings_hash`, `active_session_uuid`). Each pointer is one file;
//! updates go through the same atomic temp-file-then-rename path as the CAS
//! (spec.md §4.3).

use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::file_util;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;

pub const ACTION_LOG_HEAD: &str = "action_log_head_hash";
pub const REDO_STACK_HEAD: &str = "redo_stack_head_hash";
pub const SETTINGS: &str = "settings_hash";
pub const ACTIVE_SESSION: &str = "active_session_uuid";

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error(transparent)]
    Io(#[from] PathError),
}

pub type ScratchResult<T> = Result<T, ScratchError>;

pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn init(root: &Path) -> io::Result<Self> {
        let dir = root.join("scratch");
        file_util::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn open(root: &Path) -> Self {
        Self { dir: root.join("scratch") }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Reads a pointer's current value, or `None` if it has never been set.
    pub fn get(&self, name: &str) -> ScratchResult<Option<String>> {
        let path = self.path(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScratchError::Io(PathError { path, source: e })),
        }
    }

    /// Atomically overwrites a pointer. Used directly only by recovery code
    /// and tests; normal mutation goes through [`crate::transaction::Transaction`]
    /// so every pointer move is paired with an [`crate::backend::ActionRecord`].
    pub fn set(&self, name: &str, value: &str) -> ScratchResult<()> {
        let path = self.path(name);
        let mut temp_file = NamedTempFile::new_in(&self.dir).context(&self.dir)?;
        {
            use std::io::Write as _;
            temp_file.write_all(value.as_bytes()).context(&path)?;
        }
        file_util::persist_content_addressed_temp_file(temp_file, &path).context(&path)?;
        Ok(())
    }

    /// Removes a pointer entirely (used when an optional pointer like
    /// `redo_stack_head_hash` becomes empty).
    pub fn clear(&self, name: &str) -> ScratchResult<()> {
        let path = self.path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScratchError::Io(PathError { path, source: e })),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn unset_pointer_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap(), None);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        scratch.set(ACTION_LOG_HEAD, "abc123").unwrap();
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap(), Some("abc123".to_owned()));
        scratch.set(ACTION_LOG_HEAD, "def456").unwrap();
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap(), Some("def456".to_owned()));
    }

    #[test]
    fn clear_removes_pointer() {
        let dir = TempDir::new().unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        scratch.set(REDO_STACK_HEAD, "abc").unwrap();
        scratch.clear(REDO_STACK_HEAD).unwrap();
        assert_eq!(scratch.get(REDO_STACK_HEAD).unwrap(), None);
    }
}
