//! Repository-wide advisory lock (spec.md §4.4: "no concurrent writers").
//! Uses `std::fs::File::try_lock`, stable since Rust 1.89, rather than
//! pulling in a separate file-locking crate.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another vex process is holding the repository lock")]
    WouldBlock,
    #[error("cannot access lock file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Holds the repository lock for as long as it's alive. Dropping it releases
/// the lock (the OS releases the flock when the fd closes).
pub struct RepoLock {
    _file: File,
}

impl RepoLock {
    #[tracing::instrument]
    pub fn acquire(root: &Path) -> Result<Self, LockError> {
        let path = root.join("lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        match file.try_lock() {
            Ok(()) => {
                tracing::debug!("acquired repository lock");
                Ok(Self { _file: file })
            }
            Err(std::fs::TryLockError::WouldBlock) => Err(LockError::WouldBlock),
            Err(std::fs::TryLockError::Error(source)) => Err(LockError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = TempDir::new().unwrap();
        let first = RepoLock::acquire(dir.path()).unwrap();
        assert!(matches!(RepoLock::acquire(dir.path()), Err(LockError::WouldBlock)));
        drop(first);
        assert!(RepoLock::acquire(dir.path()).is_ok());
    }
}
