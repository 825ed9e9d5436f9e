//! Two-phase scratch-pointer transactions with crash recovery (spec.md
//! §4.4). A single mutating command may need to move several scratch
//! pointers together (e.g. `settings_hash` and the registry pointer); if the
//! process dies partway through, the repository must come back looking like
//! either none of them moved or all of them did.
//!
//! The mechanism: before touching any pointer, the full set of
//! `name -> new_value` moves is written to `pending/plan` (one atomic
//! temp-file-then-rename). Only then are the pointers actually updated.
//! Since CAS objects are already durable and idempotent to write
//! ([`crate::cas::Cas::write_raw`]), the only state that can be "half
//! moved" is the scratch pointer set, and [`recover`] repairs exactly that:
//! it re-applies the plan (a no-op for pointers that already have the new
//! value) and then deletes it. [`recover`] must run before anything else
//! touches the scratch store.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::instrument;

use crate::backend::PointerDelta;
use crate::file_util;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::scratch::Scratch;
use crate::scratch::ScratchError;

#[derive(Debug, Error)]
pub enum TxnError {
    #[error(transparent)]
    Io(#[from] PathError),
    #[error(transparent)]
    Scratch(#[from] ScratchError),
    #[error("pending transaction plan is corrupt")]
    CorruptPlan(#[source] serde_json::Error),
}

pub type TxnResult<T> = Result<T, TxnError>;

fn plan_path(root: &Path) -> PathBuf {
    root.join("pending").join("plan")
}

/// Replays and clears a leftover transaction plan, if one exists. Returns
/// whether a plan was found. Must be called once before any other scratch
/// access for a repository (spec.md H7: "a crash never leaves the scratch
/// pointers inconsistent").
#[instrument(skip(scratch))]
pub fn recover(root: &Path, scratch: &Scratch) -> TxnResult<bool> {
    let path = plan_path(root);
    let Ok(bytes) = std::fs::read(&path) else {
        return Ok(false);
    };
    tracing::warn!("found a leftover transaction plan, replaying it");
    let plan: BTreeMap<String, Option<String>> =
        serde_json::from_slice(&bytes).map_err(TxnError::CorruptPlan)?;
    apply_plan(scratch, &plan)?;
    std::fs::remove_file(&path).context(&path)?;
    Ok(true)
}

fn apply_plan(scratch: &Scratch, plan: &BTreeMap<String, Option<String>>) -> TxnResult<()> {
    for (name, value) in plan {
        match value {
            Some(v) => scratch.set(name, v)?,
            None => scratch.clear(name)?,
        }
    }
    Ok(())
}

/// Stages a set of scratch pointer moves for one mutating command. Dropping
/// a `Transaction` without calling [`Transaction::commit`] discards the
/// staged moves; nothing is written until `commit`.
pub struct Transaction<'a> {
    root: PathBuf,
    scratch: &'a Scratch,
    deltas: BTreeMap<String, PointerDelta>,
}

impl<'a> Transaction<'a> {
    pub fn begin(root: &Path, scratch: &'a Scratch) -> Self {
        Self {
            root: root.to_path_buf(),
            scratch,
            deltas: BTreeMap::new(),
        }
    }

    /// Records a pointer move relative to its current value. Calling this
    /// twice for the same name overwrites the move (the `old` value is still
    /// the pointer's value before this transaction began).
    pub fn set_pointer(&mut self, name: &str, new: Option<String>) -> TxnResult<()> {
        let old = self.scratch.get(name)?;
        self.deltas
            .entry(name.to_owned())
            .and_modify(|d| d.new = new.clone())
            .or_insert(PointerDelta { old, new });
        Ok(())
    }

    /// Commits every staged pointer move atomically with respect to crashes:
    /// a crash before the plan file is renamed into place loses the whole
    /// transaction; a crash after leaves a plan for [`recover`] to finish.
    #[instrument(skip(self))]
    pub fn commit(self) -> TxnResult<BTreeMap<String, PointerDelta>> {
        if self.deltas.is_empty() {
            return Ok(self.deltas);
        }
        let pending_dir = self.root.join("pending");
        file_util::create_or_reuse_dir(&pending_dir).context(&pending_dir)?;
        let plan: BTreeMap<&str, &Option<String>> =
            self.deltas.iter().map(|(k, v)| (k.as_str(), &v.new)).collect();
        let path = plan_path(&self.root);
        let mut temp_file = NamedTempFile::new_in(&pending_dir).context(&pending_dir)?;
        {
            use std::io::Write as _;
            let bytes = serde_json::to_vec(&plan).expect("plan is always encodable");
            temp_file.write_all(&bytes).context(&path)?;
        }
        file_util::persist_content_addressed_temp_file(temp_file, &path).context(&path)?;
        let owned_plan: BTreeMap<String, Option<String>> =
            self.deltas.iter().map(|(k, v)| (k.clone(), v.new.clone())).collect();
        apply_plan(self.scratch, &owned_plan)?;
        std::fs::remove_file(&path).context(&path)?;
        Ok(self.deltas)
    }

    pub fn abort(self) {}
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::scratch::ACTION_LOG_HEAD;

    #[test]
    fn commit_applies_all_pointer_moves() {
        let dir = TempDir::new().unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        let mut txn = Transaction::begin(dir.path(), &scratch);
        txn.set_pointer(ACTION_LOG_HEAD, Some("aaa".into())).unwrap();
        txn.set_pointer("settings_hash", Some("bbb".into())).unwrap();
        let deltas = txn.commit().unwrap();
        assert_eq!(deltas[ACTION_LOG_HEAD].new.as_deref(), Some("aaa"));
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap().as_deref(), Some("aaa"));
        assert_eq!(scratch.get("settings_hash").unwrap().as_deref(), Some("bbb"));
    }

    #[test]
    fn abort_applies_nothing() {
        let dir = TempDir::new().unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        let mut txn = Transaction::begin(dir.path(), &scratch);
        txn.set_pointer(ACTION_LOG_HEAD, Some("aaa".into())).unwrap();
        txn.abort();
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap(), None);
    }

    #[test]
    fn recover_replays_leftover_plan() {
        let dir = TempDir::new().unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        let pending_dir = dir.path().join("pending");
        std::fs::create_dir_all(&pending_dir).unwrap();
        std::fs::write(pending_dir.join("plan"), br#"{"action_log_head_hash":"ccc"}"#).unwrap();
        assert!(recover(dir.path(), &scratch).unwrap());
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap().as_deref(), Some("ccc"));
        assert!(!plan_path(dir.path()).is_file());
        assert!(!recover(dir.path(), &scratch).unwrap());
    }
}
