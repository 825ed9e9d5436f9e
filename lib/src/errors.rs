//! The command-layer error umbrella (spec.md §7): every public entry point
//! returns a [`VexError`], carrying the taxonomy `UsageError`/`DomainError`/
//! `IoError`/`CorruptObject`/`ConcurrentWriter`/`RecoverableHalt` and mapping
//! to the exit codes spec.md §6 defines, the way the teacher's CLI maps its
//! own `CommandError` to a process exit status.

use thiserror::Error;

use crate::action_log::ActionLogError;
use crate::backend::BackendError;
use crate::cas::CasError;
use crate::lock::LockError;
use crate::project::ProjectError;
use crate::scratch::ScratchError;
use crate::transaction::TxnError;

#[derive(Debug, Error)]
pub enum VexError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Domain(String),
    #[error("{path}: {source}")]
    Io { path: std::path::PathBuf, source: std::io::Error },
    #[error("corrupt object: {0}")]
    CorruptObject(String),
    #[error("repository is locked by another process")]
    ConcurrentWriter,
    #[error("recovered a half-applied transaction: {0}")]
    RecoverableHalt(String),
}

pub type VexResult<T> = Result<T, VexError>;

/// The exit code spec.md §6 assigns to each error kind.
pub fn exit_code(err: &VexError) -> i32 {
    match err {
        VexError::Domain(_) => 1,
        VexError::Usage(_) => 2,
        VexError::Io { .. } | VexError::CorruptObject(_) => 3,
        VexError::ConcurrentWriter => 4,
        VexError::RecoverableHalt(_) => 0,
    }
}

impl From<ProjectError> for VexError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::Cas(e) => e.into(),
            ProjectError::Scratch(ScratchError::Io(path_err)) => VexError::Io {
                path: path_err.path,
                source: path_err.source,
            },
            ProjectError::Txn(e) => e.into(),
            ProjectError::Lock(e) => e.into(),
            ProjectError::Io(source) => VexError::Io {
                path: std::path::PathBuf::new(),
                source,
            },
            ProjectError::NotARepository(path) => VexError::Usage(format!("not a vex repository (no .vex found above {})", path.display())),
            ProjectError::Domain(msg) => VexError::Domain(msg),
            ProjectError::Usage(msg) => VexError::Usage(msg),
        }
    }
}

impl From<CasError> for VexError {
    fn from(e: CasError) -> Self {
        match e {
            CasError::Io(path_err) => VexError::Io {
                path: path_err.path,
                source: path_err.source,
            },
            CasError::NotFound { hash } => VexError::CorruptObject(format!("object {hash} not found")),
            CasError::Backend(BackendError::CorruptObject { hash, source }) => VexError::CorruptObject(format!("{hash}: {source}")),
            CasError::Backend(BackendError::MalformedBlob { hash }) => VexError::CorruptObject(format!("{hash}: malformed blob body")),
        }
    }
}

impl From<TxnError> for VexError {
    fn from(e: TxnError) -> Self {
        VexError::Io {
            path: std::path::PathBuf::new(),
            source: std::io::Error::other(e.to_string()),
        }
    }
}

impl From<LockError> for VexError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::WouldBlock => VexError::ConcurrentWriter,
            LockError::Io { path, source } => VexError::Io { path, source },
        }
    }
}

impl From<ActionLogError> for VexError {
    fn from(e: ActionLogError) -> Self {
        match e {
            ActionLogError::Cas(e) => e.into(),
            ActionLogError::Scratch(ScratchError::Io(path_err)) => VexError::Io {
                path: path_err.path,
                source: path_err.source,
            },
            ActionLogError::Txn(e) => e.into(),
            other => VexError::Domain(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec() {
        assert_eq!(exit_code(&VexError::Domain("x".into())), 1);
        assert_eq!(exit_code(&VexError::Usage("x".into())), 2);
        assert_eq!(
            exit_code(&VexError::Io {
                path: "x".into(),
                source: std::io::Error::other("y")
            }),
            3
        );
        assert_eq!(exit_code(&VexError::CorruptObject("x".into())), 3);
        assert_eq!(exit_code(&VexError::ConcurrentWriter), 4);
        assert_eq!(exit_code(&VexError::RecoverableHalt("x".into())), 0);
    }

    #[test]
    fn project_domain_error_becomes_vex_domain_error() {
        let err: VexError = ProjectError::Domain("nothing to commit".into()).into();
        assert!(matches!(err, VexError::Domain(_)));
        assert_eq!(exit_code(&err), 1);
    }
}
