//! The project model (spec.md §4.6): commits, branches, sessions, the
//! working-copy manifest, and the mutation rules binding them together.
//! Everything here runs inside one [`crate::transaction::Transaction`] per
//! command, the way the teacher's workspace layer wraps every mutation in
//! one `Transaction`.

pub mod branch;
pub mod commit;
pub mod manifest;
pub mod settings;

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::Registry;
use crate::backend::Session;
use crate::backend::Settings;
use crate::cas::Cas;
use crate::cas::CasError;
use crate::lock::LockError;
use crate::lock::RepoLock;
use crate::object_id::ObjectId as _;
use crate::object_id::RegistryId;
use crate::object_id::SessionId;
use crate::scratch::ACTIVE_SESSION;
use crate::scratch::REDO_STACK_HEAD;
use crate::scratch::SETTINGS;
use crate::scratch::Scratch;
use crate::scratch::ScratchError;
use crate::transaction;
use crate::transaction::TxnError;
use crate::uuid_util::Uuid;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Cas(#[from] CasError),
    #[error(transparent)]
    Scratch(#[from] ScratchError),
    #[error(transparent)]
    Txn(#[from] TxnError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not a vex repository (no .vex found above {0})")]
    NotARepository(PathBuf),
    #[error("{0}")]
    Domain(String),
    #[error("{0}")]
    Usage(String),
}

pub type ProjectResult<T> = Result<T, ProjectError>;

/// Walks upward from `start` looking for a `.vex` directory, the way the
/// teacher's CLI resolves a repository root from the working directory.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(".vex");
        if candidate.is_dir() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

/// An open repository: the `.vex` directory plus the working-copy root it
/// was resolved from.
pub struct Project {
    pub dot_vex: PathBuf,
    pub work_dir: PathBuf,
    pub cas: Cas,
    pub scratch: Scratch,
}

impl Project {
    /// Creates repository scaffolding under `<path>/.vex/` (spec.md §6's
    /// on-disk layout). Does not itself write `Settings`/`Commit`/`Branch`/
    /// `Session` — that's `crate::commands::handlers::init`'s job, since it
    /// must run inside the usual transaction + action-log bookkeeping.
    pub fn scaffold(path: &Path) -> ProjectResult<Self> {
        let dot_vex = path.join(".vex");
        crate::file_util::create_dir_all(&dot_vex)?;
        let cas = Cas::init(&dot_vex)?;
        let scratch = Scratch::init(&dot_vex)?;
        Ok(Self {
            dot_vex,
            work_dir: path.to_path_buf(),
            cas,
            scratch,
        })
    }

    /// Opens an existing repository, replaying any leftover transaction
    /// plan first (spec.md H7 / §4.4's recovery protocol).
    pub fn open(start: &Path) -> ProjectResult<Self> {
        let dot_vex = find_root(start).ok_or_else(|| ProjectError::NotARepository(start.to_path_buf()))?;
        let work_dir = dot_vex.parent().unwrap().to_path_buf();
        let cas = Cas::open(&dot_vex);
        let scratch = Scratch::open(&dot_vex);
        transaction::recover(&dot_vex, &scratch)?;
        Ok(Self {
            dot_vex,
            work_dir,
            cas,
            scratch,
        })
    }

    pub fn lock(&self) -> Result<RepoLock, LockError> {
        RepoLock::acquire(&self.dot_vex)
    }

    pub fn settings(&self) -> ProjectResult<Settings> {
        let hash = self
            .scratch
            .get(SETTINGS)?
            .ok_or_else(|| ProjectError::Domain("repository has no settings; run init first".into()))?;
        Ok(self.cas.get(&crate::object_id::SettingsId::from_hex(&hash))?)
    }

    pub fn active_session_uuid(&self) -> ProjectResult<Uuid> {
        let hex = self
            .scratch
            .get(ACTIVE_SESSION)?
            .ok_or_else(|| ProjectError::Domain("no active session".into()))?;
        Uuid::from_hex(&hex).ok_or_else(|| ProjectError::Domain("corrupt active_session_uuid pointer".into()))
    }

    pub fn registry_id(&self) -> ProjectResult<RegistryId> {
        let hash = self.active_action_registry_hash()?;
        Ok(RegistryId::from_hex(&hash))
    }

    /// The registry hash is reached through the action log head (SPEC_FULL.md
    /// §5), not a scratch pointer of its own: it's the most recent
    /// `"registry"` entry in `ActionRecord.physical` walking back from
    /// `action_log_head_hash`.
    fn active_action_registry_hash(&self) -> ProjectResult<String> {
        let mut next = self.scratch.get(crate::scratch::ACTION_LOG_HEAD)?;
        while let Some(hex) = next {
            let id = crate::object_id::ActionId::from_hex(&hex);
            let record: crate::backend::ActionRecord = self.cas.get(&id)?;
            if let Some(delta) = record.physical.get("registry") {
                if let Some(new) = &delta.new {
                    return Ok(new.clone());
                }
            }
            next = record.prev.map(|p| p.hex());
        }
        Err(ProjectError::Domain("repository has no registry; run init first".into()))
    }

    pub fn active_session(&self) -> ProjectResult<Session> {
        let uuid = self.active_session_uuid()?;
        let registry = self.registry_id()?;
        crate::registry::resolve_session(&self.cas, &registry, &uuid)?
            .ok_or_else(|| ProjectError::Domain("active session not found in registry".into()))
    }

    pub fn active_session_id(&self) -> ProjectResult<SessionId> {
        let registry: Registry = self.cas.get(&self.registry_id()?)?;
        let uuid = self.active_session_uuid()?;
        registry
            .sessions
            .get(&uuid.hex())
            .cloned()
            .ok_or_else(|| ProjectError::Domain("active session not found in registry".into()))
    }

    pub fn has_pending_redo(&self) -> ProjectResult<bool> {
        Ok(self.scratch.get(REDO_STACK_HEAD)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn open_fails_outside_a_repository() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(Project::open(dir.path()), Err(ProjectError::NotARepository(_))));
    }

    #[test]
    fn open_finds_root_from_a_subdirectory() {
        let dir = TempDir::new().unwrap();
        Project::scaffold(dir.path()).unwrap();
        let sub = dir.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();
        let project = Project::open(&sub).unwrap();
        assert_eq!(project.work_dir, dir.path());
    }
}
