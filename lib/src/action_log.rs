//! The undo/redo backbone (spec.md §4.5): appending actions, walking the
//! chain backward for `undo`/`undo:list`, and walking the (possibly
//! branching) redo stack for `redo`/`redo:list`.
//!
//! Every command in this crate's command layer records a *physical*
//! inverse: undo restores old scratch-pointer values directly, which is
//! exact and free of replay cost. The schema also supports a *logical*
//! inverse (`LogicalOp` naming a command to re-run) for commands whose
//! effect cannot be captured as a pointer swap; none of this crate's own
//! commands need it, but `undo`/`redo` handle it by calling back into the
//! command dispatcher through the `runner` callback (see DESIGN.md).

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::instrument;

use crate::backend::ActionRecord;
use crate::backend::ArgValue;
use crate::backend::LogicalOp;
use crate::backend::PointerDelta;
use crate::backend::RedoAlternative;
use crate::backend::RedoNode;
use crate::cas::Cas;
use crate::cas::CasError;
use crate::object_id::ActionId;
use crate::object_id::ObjectId;
use crate::object_id::RedoNodeId;
use crate::scratch::ACTION_LOG_HEAD;
use crate::scratch::REDO_STACK_HEAD;
use crate::scratch::Scratch;
use crate::scratch::ScratchError;
use crate::transaction::Transaction;
use crate::transaction::TxnError;

#[derive(Debug, Error)]
pub enum ActionLogError {
    #[error(transparent)]
    Cas(#[from] CasError),
    #[error(transparent)]
    Scratch(#[from] ScratchError),
    #[error(transparent)]
    Txn(#[from] TxnError),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("redo is ambiguous; choose one of: {}", .alternatives.join(", "))]
    AmbiguousRedo { alternatives: Vec<String> },
    #[error("no such redo alternative {choice}")]
    InvalidChoice { choice: usize },
    #[error("redo alternative is a nested fork, which this crate doesn't resolve past one level")]
    NestedForkUnsupported,
    #[error("{0}")]
    Command(String),
}

pub type ActionLogResult<T> = Result<T, ActionLogError>;

/// Re-runs a command by (command name, canonical args), returning the id of
/// the `ActionRecord` the rerun command appended. Supplied by the command
/// dispatcher so `action_log` doesn't depend on it directly.
pub type CommandRunner<'a> = dyn Fn(&LogicalOp) -> ActionLogResult<ActionId> + 'a;

fn read_action_head(scratch: &Scratch) -> ActionLogResult<Option<ActionId>> {
    Ok(scratch.get(ACTION_LOG_HEAD)?.map(|h| ActionId::from_hex(&h)))
}

fn read_redo_head(scratch: &Scratch) -> ActionLogResult<Option<RedoNodeId>> {
    Ok(scratch.get(REDO_STACK_HEAD)?.map(|h| RedoNodeId::from_hex(&h)))
}

/// Appends a new action to the log. `domain_deltas` are the non-spine
/// scratch pointers this command changed (e.g. `settings_hash`, the
/// registry pointer); `action_log_head_hash` and `redo_stack_head_hash` are
/// managed here, not by the caller.
#[instrument(skip(cas, scratch, args, domain_deltas, inverse))]
pub fn append(
    cas: &Cas,
    scratch: &Scratch,
    root: &Path,
    command: &str,
    args: BTreeMap<String, ArgValue>,
    domain_deltas: BTreeMap<String, PointerDelta>,
    inverse: LogicalOp,
    timestamp: i64,
) -> ActionLogResult<ActionId> {
    let old_head = read_action_head(scratch)?;
    let record = ActionRecord {
        prev: old_head.clone(),
        command: command.to_owned(),
        args,
        physical: domain_deltas.clone(),
        inverse,
        timestamp,
    };
    let new_id = cas.put(&record)?;

    let mut txn = Transaction::begin(root, scratch);
    for (name, delta) in &domain_deltas {
        txn.set_pointer(name, delta.new.clone())?;
    }
    txn.set_pointer(ACTION_LOG_HEAD, Some(new_id.hex()))?;

    if let Some(old_redo_head) = read_redo_head(scratch)? {
        let current_entry = RedoNode::Entry {
            action: new_id.clone(),
            based_on: old_head,
            prior: None,
        };
        let current_id = cas.put(&current_entry)?;
        let fork = RedoNode::Fork {
            alternatives: vec![
                RedoAlternative {
                    label: "redo".into(),
                    node: old_redo_head,
                },
                RedoAlternative {
                    label: "current".into(),
                    node: current_id,
                },
            ],
        };
        let fork_id = cas.put(&fork)?;
        txn.set_pointer(REDO_STACK_HEAD, Some(fork_id.hex()))?;
        tracing::debug!("new action diverged from the redo stack; forked it");
    }

    txn.commit()?;
    Ok(new_id)
}

pub enum UndoOutcome {
    /// The undone action's inverse was physical: pointers were restored
    /// directly and the action log head moved back to `record.prev`.
    Restored(ActionId),
    /// The undone action's inverse was logical: running it appended a new
    /// action, returned here.
    Replayed(ActionId),
}

#[instrument(skip(cas, scratch, runner))]
pub fn undo(cas: &Cas, scratch: &Scratch, root: &Path, runner: &CommandRunner<'_>) -> ActionLogResult<UndoOutcome> {
    let head_id = read_action_head(scratch)?.ok_or(ActionLogError::NothingToUndo)?;
    let record: ActionRecord = cas.get(&head_id)?;

    if record.inverse.is_physical() {
        let mut txn = Transaction::begin(root, scratch);
        for (name, delta) in &record.physical {
            txn.set_pointer(name, delta.old.clone())?;
        }
        txn.set_pointer(ACTION_LOG_HEAD, record.prev.as_ref().map(ObjectId::hex))?;

        let old_redo_head = read_redo_head(scratch)?;
        let entry = RedoNode::Entry {
            action: head_id.clone(),
            based_on: record.prev.clone(),
            prior: old_redo_head,
        };
        let entry_id = cas.put(&entry)?;
        txn.set_pointer(REDO_STACK_HEAD, Some(entry_id.hex()))?;
        txn.commit()?;
        Ok(UndoOutcome::Restored(head_id))
    } else {
        let new_id = runner(&record.inverse)?;

        // `runner` already committed its own transaction (appending `new_id`
        // and, if a redo stack existed, forking it); push our own entry on
        // top so `redo` can find its way back to `head_id`'s forward command.
        let old_redo_head = read_redo_head(scratch)?;
        let entry = RedoNode::Entry {
            action: head_id,
            based_on: record.prev,
            prior: old_redo_head,
        };
        let entry_id = cas.put(&entry)?;
        let mut txn = Transaction::begin(root, scratch);
        txn.set_pointer(REDO_STACK_HEAD, Some(entry_id.hex()))?;
        txn.commit()?;

        Ok(UndoOutcome::Replayed(new_id))
    }
}

pub enum RedoOutcome {
    /// Forward-swapped pointers directly back to the action's recorded
    /// values; exact restoration, no command was re-run.
    Restored(ActionId),
    /// The action log had diverged since this entry was pushed (or its
    /// inverse was logical), so the forward command was re-run instead.
    Replayed(ActionId),
    /// The chosen alternative was already the current state; nothing to do.
    NoOp,
}

/// `choice` is 1-based, matching what `redo:list` prints. Required whenever
/// the current redo-stack head is a `Fork`.
#[instrument(skip(cas, scratch, runner))]
pub fn redo(
    cas: &Cas,
    scratch: &Scratch,
    root: &Path,
    choice: Option<usize>,
    runner: &CommandRunner<'_>,
) -> ActionLogResult<RedoOutcome> {
    let head_id = read_redo_head(scratch)?.ok_or(ActionLogError::NothingToRedo)?;
    let head: RedoNode = cas.get(&head_id)?;

    let (entry_id, new_redo_head) = match head {
        RedoNode::Entry { prior, .. } => (head_id, prior),
        RedoNode::Fork { ref alternatives } => {
            let choice = choice.ok_or_else(|| ActionLogError::AmbiguousRedo {
                alternatives: alternatives.iter().map(|a| a.label.clone()).collect(),
            })?;
            let alt = choice
                .checked_sub(1)
                .and_then(|i| alternatives.get(i))
                .ok_or(ActionLogError::InvalidChoice { choice })?;
            (alt.node.clone(), None)
        }
    };
    let entry: RedoNode = cas.get(&entry_id)?;
    let RedoNode::Entry { action, based_on, .. } = entry else {
        return Err(ActionLogError::NestedForkUnsupported);
    };
    let record: ActionRecord = cas.get(&action)?;
    let current_head = read_action_head(scratch)?;
    let is_current_already = current_head.as_ref() == Some(&action);
    let clean = current_head == based_on;

    if is_current_already {
        let mut txn = Transaction::begin(root, scratch);
        txn.set_pointer(REDO_STACK_HEAD, new_redo_head.as_ref().map(ObjectId::hex))?;
        txn.commit()?;
        return Ok(RedoOutcome::NoOp);
    }

    if clean && record.inverse.is_physical() {
        let mut txn = Transaction::begin(root, scratch);
        for (name, delta) in &record.physical {
            txn.set_pointer(name, delta.new.clone())?;
        }
        txn.set_pointer(ACTION_LOG_HEAD, Some(action.hex()))?;
        txn.set_pointer(REDO_STACK_HEAD, new_redo_head.as_ref().map(ObjectId::hex))?;
        txn.commit()?;
        Ok(RedoOutcome::Restored(action))
    } else {
        let mut txn = Transaction::begin(root, scratch);
        txn.set_pointer(REDO_STACK_HEAD, new_redo_head.as_ref().map(ObjectId::hex))?;
        txn.commit()?;
        let forward = LogicalOp {
            command: record.command.clone(),
            args: record.args.clone(),
        };
        let new_id = runner(&forward)?;
        Ok(RedoOutcome::Replayed(new_id))
    }
}

/// One row of `undo:list`/`redo:list` output.
#[derive(Debug)]
pub struct LoggedCommand {
    pub command: String,
    pub timestamp: i64,
}

pub fn undo_list(cas: &Cas, scratch: &Scratch, limit: usize) -> ActionLogResult<Vec<LoggedCommand>> {
    let mut out = Vec::new();
    let mut next = read_action_head(scratch)?;
    while let Some(id) = next {
        if out.len() >= limit {
            break;
        }
        let record: ActionRecord = cas.get(&id)?;
        out.push(LoggedCommand {
            command: record.command.clone(),
            timestamp: record.timestamp,
        });
        next = record.prev;
    }
    Ok(out)
}

/// One choosable alternative in `redo:list` output, 1-based like `--choice`.
#[derive(Debug)]
pub struct RedoChoice {
    pub choice: usize,
    pub label: String,
    pub command: String,
}

pub fn redo_list(cas: &Cas, scratch: &Scratch) -> ActionLogResult<Vec<RedoChoice>> {
    let Some(head_id) = read_redo_head(scratch)? else {
        return Ok(Vec::new());
    };
    let head: RedoNode = cas.get(&head_id)?;
    let alternatives = match head {
        RedoNode::Entry { action, .. } => {
            vec![RedoAlternative {
                label: "redo".into(),
                node: head_id,
            }]
            .into_iter()
            .map(|alt| (alt, action.clone()))
            .collect::<Vec<_>>()
        }
        RedoNode::Fork { alternatives } => alternatives
            .into_iter()
            .filter_map(|alt| match cas.get::<RedoNode>(&alt.node) {
                Ok(RedoNode::Entry { action, .. }) => Some((alt, action)),
                _ => None,
            })
            .collect(),
    };
    alternatives
        .into_iter()
        .enumerate()
        .map(|(i, (alt, action))| {
            let record: ActionRecord = cas.get(&action)?;
            Ok(RedoChoice {
                choice: i + 1,
                label: alt.label,
                command: record.command,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn no_logical(_: &LogicalOp) -> ActionLogResult<ActionId> {
        panic!("this test's actions are all physical")
    }

    fn physical_delta(name: &str, old: Option<&str>, new: Option<&str>) -> BTreeMap<String, PointerDelta> {
        BTreeMap::from([(
            name.to_owned(),
            PointerDelta {
                old: old.map(str::to_owned),
                new: new.map(str::to_owned),
            },
        )])
    }

    #[test]
    fn append_then_undo_restores_prior_pointer() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();

        append(
            &cas,
            &scratch,
            dir.path(),
            "add",
            BTreeMap::new(),
            physical_delta("settings_hash", None, Some("hash1")),
            LogicalOp::physical(),
            1,
        )
        .unwrap();
        assert_eq!(scratch.get("settings_hash").unwrap().as_deref(), Some("hash1"));

        let outcome = undo(&cas, &scratch, dir.path(), &no_logical).unwrap();
        assert!(matches!(outcome, UndoOutcome::Restored(_)));
        assert_eq!(scratch.get("settings_hash").unwrap(), None);
        assert_eq!(scratch.get(ACTION_LOG_HEAD).unwrap(), None);
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();

        append(
            &cas,
            &scratch,
            dir.path(),
            "add",
            BTreeMap::new(),
            physical_delta("settings_hash", None, Some("hash1")),
            LogicalOp::physical(),
            1,
        )
        .unwrap();
        undo(&cas, &scratch, dir.path(), &no_logical).unwrap();
        let outcome = redo(&cas, &scratch, dir.path(), None, &no_logical).unwrap();
        assert!(matches!(outcome, RedoOutcome::Restored(_)));
        assert_eq!(scratch.get("settings_hash").unwrap().as_deref(), Some("hash1"));
        assert_eq!(scratch.get(REDO_STACK_HEAD).unwrap(), None);
    }

    #[test]
    fn new_action_after_undo_forks_the_redo_stack() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();

        append(
            &cas,
            &scratch,
            dir.path(),
            "add b.py",
            BTreeMap::new(),
            physical_delta("settings_hash", None, Some("b_only")),
            LogicalOp::physical(),
            1,
        )
        .unwrap();
        undo(&cas, &scratch, dir.path(), &no_logical).unwrap();
        append(
            &cas,
            &scratch,
            dir.path(),
            "add c.py",
            BTreeMap::new(),
            physical_delta("settings_hash", None, Some("c_only")),
            LogicalOp::physical(),
            2,
        )
        .unwrap();

        let choices = redo_list(&cas, &scratch).unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].command, "add b.py");
        assert_eq!(choices[1].command, "add c.py");

        let outcome = redo(&cas, &scratch, dir.path(), Some(2), &no_logical).unwrap();
        assert!(matches!(outcome, RedoOutcome::NoOp));
    }

    #[test]
    fn undo_list_walks_backward_in_order() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let scratch = Scratch::init(dir.path()).unwrap();
        for (i, name) in ["add", "commit", "switch"].iter().enumerate() {
            append(
                &cas,
                &scratch,
                dir.path(),
                name,
                BTreeMap::new(),
                physical_delta("settings_hash", None, Some(&format!("h{i}"))),
                LogicalOp::physical(),
                i as i64,
            )
            .unwrap();
        }
        let log = undo_list(&cas, &scratch, 10).unwrap();
        let commands: Vec<_> = log.iter().map(|l| l.command.as_str()).collect();
        assert_eq!(commands, vec!["switch", "commit", "add"]);
    }
}
