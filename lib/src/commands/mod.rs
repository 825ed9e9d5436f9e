//! The fixed command registry (spec.md §4.6, §9: "a table from canonical
//! command name to `{parameter schema, handler, inverse-kind}`"). Every
//! mutating command here runs inside one [`crate::project::Project`]
//! transaction and appends exactly one [`crate::action_log`] entry; read-only
//! commands (`status`) never touch the action log.
//!
//! Logical-inverse undo/redo calls back into [`execute`] through
//! [`make_runner`] rather than a separate "suppressed" execution path: each
//! logical inverse in this crate (`branch:open`'s re-open, `switch`'s
//! re-switch, `restore:raw`'s re-write) is itself just another legitimate
//! forward command, so replaying it appends a fresh action like any other
//! command would. See DESIGN.md for why this departs from spec.md §4.5's
//! literal "append suppressed" wording while still producing the same
//! observable undo/redo behavior.
//!
//! `fake`/`debug`/`debug:rollback` (spec.md §4.7) wrap this registry rather
//! than extending it: `fake` runs a named command to completion but aborts
//! its transaction instead of committing it, `debug` runs it for real but
//! reports a domain failure instead of propagating it, and `debug:rollback`
//! exposes the crash-recovery routine [`crate::transaction::recover`] for
//! manual invocation.

mod args;

use std::path::Path;

use chrono::Utc;

use crate::action_log;
use crate::action_log::ActionLogError;
use crate::action_log::ActionLogResult;
use crate::action_log::RedoOutcome;
use crate::action_log::UndoOutcome;
use crate::backend::ArgValue;
use crate::backend::Branch;
use crate::backend::Commit;
use crate::backend::CommitKind;
use crate::backend::EntryKind;
use crate::backend::LogicalOp;
use crate::backend::Manifest;
use crate::backend::ManifestEntry;
use crate::backend::PointerDelta;
use crate::backend::Properties;
use crate::backend::Session;
use crate::backend::SessionMode;
use crate::backend::TrackStatus;
use crate::object_id::ActionId;
use crate::object_id::CommitId;
use crate::object_id::FileId;
use crate::object_id::ObjectId as _;
use crate::object_id::RegistryId;
use crate::project::Project;
use crate::project::ProjectError;
use crate::project::ProjectResult;
use crate::project::branch;
use crate::project::commit as commit_mod;
use crate::project::manifest;
use crate::project::settings;
use crate::registry;
use crate::repo_path::RepoPath;
use crate::scratch::ACTION_LOG_HEAD;
use crate::scratch::ACTIVE_SESSION;
use crate::scratch::SETTINGS;
use crate::transaction::Transaction;
use crate::uuid_util::Uuid;

pub use args::get_bool;
pub use args::get_repeated;
pub use args::get_single;

/// What a command prints, independent of text vs `--json` rendering
/// (spec.md §6: "a single canonical JSON document on stdout").
#[derive(Debug)]
pub enum CommandOutput {
    Unit,
    Message(String),
    Status(Vec<manifest::StatusEntry>),
    Log(Vec<LogLine>),
    UndoList(Vec<action_log::LoggedCommand>),
    RedoList(Vec<action_log::RedoChoice>),
}

#[derive(Debug)]
pub struct LogLine {
    pub commit: CommitId,
    pub message: String,
    pub timestamp_applied: i64,
}

struct Staged {
    output: CommandOutput,
    registry_delta: Option<RegistryId>,
    settings_delta: Option<crate::object_id::SettingsId>,
    active_session_delta: Option<Uuid>,
    inverse: LogicalOp,
}

fn unit(inverse: LogicalOp) -> Staged {
    Staged {
        output: CommandOutput::Unit,
        registry_delta: None,
        settings_delta: None,
        active_session_delta: None,
        inverse,
    }
}

fn physical() -> LogicalOp {
    LogicalOp::physical()
}

/// Runs `command` against `project`, appending one action-log entry for
/// every mutating command. `cwd` resolves user-supplied relative paths.
/// Acquires the repository lock (spec.md §4.4) for the duration of any
/// command that writes; held across nested re-entry from [`make_runner`]
/// so a replayed logical inverse doesn't try to re-acquire its own lock.
pub fn execute(project: &Project, cwd: &Path, command: &str, args: std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<CommandOutput> {
    if matches!(command, "status" | "log" | "undo:list" | "redo:list") {
        return execute_readonly(project, command, &args);
    }
    let _lock = project.lock()?;
    execute_locked(project, cwd, command, args)
}

fn execute_locked(project: &Project, cwd: &Path, command: &str, args: std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<CommandOutput> {
    if matches!(command, "status" | "log" | "undo:list" | "redo:list") {
        return execute_readonly(project, command, &args);
    }
    if matches!(command, "undo" | "redo") {
        return execute_history(project, cwd, command, &args);
    }
    if command == "fake" {
        return execute_fake(project, cwd, args);
    }
    if command == "debug" {
        return execute_debug(project, cwd, args);
    }
    if command == "debug:rollback" {
        return execute_debug_rollback(project);
    }

    let staged = execute_mutating(project, cwd, command, &args, false)?;
    finalize(project, command, args, staged)
}

/// Stages a mutating command's pointer deltas and appends the action-log
/// entry for it. Shared by the ordinary dispatch path and `debug`'s
/// success case, which only differs in how it reacts to the inner command
/// failing.
fn finalize(project: &Project, command: &str, args: std::collections::BTreeMap<String, ArgValue>, staged: Staged) -> ProjectResult<CommandOutput> {
    let mut domain_deltas = std::collections::BTreeMap::new();
    if let Some(new_registry) = staged.registry_delta {
        let old = project.active_action_registry_hash_opt()?;
        domain_deltas.insert("registry".to_owned(), PointerDelta { old, new: Some(new_registry.hex()) });
    }
    if let Some(new_settings) = staged.settings_delta {
        let old = project.scratch.get(SETTINGS)?;
        domain_deltas.insert(SETTINGS.to_owned(), PointerDelta { old, new: Some(new_settings.hex()) });
    }
    if let Some(new_active) = staged.active_session_delta {
        let old = project.scratch.get(ACTIVE_SESSION)?;
        domain_deltas.insert(ACTIVE_SESSION.to_owned(), PointerDelta { old, new: Some(new_active.hex()) });
    }

    if domain_deltas.is_empty() {
        return Ok(staged.output);
    }

    action_log::append(
        &project.cas,
        &project.scratch,
        &project.dot_vex,
        command,
        args,
        domain_deltas,
        staged.inverse,
        Utc::now().timestamp(),
    )
    .map_err(|e| match e {
        ActionLogError::Cas(e) => ProjectError::Cas(e),
        ActionLogError::Scratch(e) => ProjectError::Scratch(e),
        ActionLogError::Txn(e) => ProjectError::Txn(e),
        other => ProjectError::Domain(other.to_string()),
    })?;
    Ok(staged.output)
}

/// Pulls the `--command=<name>` the meta-commands (`fake`, `debug`) wrap,
/// and the rest of the flags to forward to it. Encoding the inner command
/// this way, rather than nesting a second argument map, keeps every
/// command's argument list one of the four shapes spec.md §6 allows.
fn split_meta_args(mut args: std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<(String, std::collections::BTreeMap<String, ArgValue>)> {
    match args.remove("command") {
        Some(ArgValue::Single(inner)) => Ok((inner, args)),
        _ => Err(ProjectError::Usage("missing --command".into())),
    }
}

fn reject_meta_command(name: &str) -> ProjectResult<()> {
    if matches!(name, "fake" | "debug" | "debug:rollback" | "status" | "log" | "undo" | "redo" | "undo:list" | "redo:list") {
        return Err(ProjectError::Usage(format!("fake/debug cannot wrap {name:?}")));
    }
    Ok(())
}

/// `fake <command>`: runs `command` all the way through, including its CAS
/// writes (harmless: content-addressed and idempotent), but stages its
/// scratch-pointer deltas in a [`Transaction`] it then [`Transaction::abort`]s
/// instead of committing, and reports what would have moved (spec.md §4.7).
/// Never reaches [`action_log::append`], so nothing is recorded to undo.
/// Working-copy side effects of `restore`/`restore:raw`/`branch:open` are
/// skipped outright via the `dry_run` flag threaded into [`execute_mutating`].
fn execute_fake(project: &Project, cwd: &Path, args: std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<CommandOutput> {
    let (inner_command, inner_args) = split_meta_args(args)?;
    reject_meta_command(&inner_command)?;
    let staged = execute_mutating(project, cwd, &inner_command, &inner_args, true)?;

    let mut txn = Transaction::begin(&project.dot_vex, &project.scratch);
    let mut notes = Vec::new();
    if let Some(new_settings) = &staged.settings_delta {
        txn.set_pointer(SETTINGS, Some(new_settings.hex()))?;
        notes.push(format!("{SETTINGS} -> {}", new_settings.hex()));
    }
    if let Some(new_active) = &staged.active_session_delta {
        txn.set_pointer(ACTIVE_SESSION, Some(new_active.hex()))?;
        notes.push(format!("{ACTIVE_SESSION} -> {}", new_active.hex()));
    }
    if let Some(new_registry) = &staged.registry_delta {
        notes.push(format!("registry -> {}", new_registry.hex()));
    }
    txn.abort();

    if notes.is_empty() {
        Ok(CommandOutput::Message(format!("fake {inner_command}: no pointer changes")))
    } else {
        Ok(CommandOutput::Message(format!("fake {inner_command} would write: {}", notes.join(", "))))
    }
}

/// `debug <command>`: runs `command` for real, same as a direct call, except
/// a [`ProjectError::Domain`] from the inner command is not propagated as a
/// failure. Ordinary dispatch never gets this far on a domain error (nothing
/// is staged, so nothing is appended), so there is no implicit rollback for
/// `debug` to disable; instead it reports the failure and leaves whatever
/// CAS objects the attempt already wrote (they're content-addressed and were
/// never going to be deleted) for inspection, per spec.md §4.7. See
/// DESIGN.md for why this crate has no half-applied *pointer* state to show.
fn execute_debug(project: &Project, cwd: &Path, args: std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<CommandOutput> {
    let (inner_command, inner_args) = split_meta_args(args)?;
    reject_meta_command(&inner_command)?;
    match execute_mutating(project, cwd, &inner_command, &inner_args, false) {
        Ok(staged) => finalize(project, &inner_command, inner_args, staged),
        Err(ProjectError::Domain(msg)) => Ok(CommandOutput::Message(format!(
            "debug {inner_command}: hit a domain error ({msg}); any CAS objects already written for this attempt remain for inspection"
        ))),
        Err(e) => Err(e),
    }
}

/// `debug:rollback`: invokes the §4.4 recovery routine directly, for
/// inspecting or repairing a repository left with a leftover `pending/plan`
/// file after a crash mid-commit.
fn execute_debug_rollback(project: &Project) -> ProjectResult<CommandOutput> {
    let replayed = crate::transaction::recover(&project.dot_vex, &project.scratch)?;
    if replayed {
        Ok(CommandOutput::Message("recovered a leftover transaction plan".into()))
    } else {
        Ok(CommandOutput::Message("nothing to recover".into()))
    }
}

fn execute_readonly(project: &Project, command: &str, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<CommandOutput> {
    match command {
        "status" => {
            let session = project.active_session()?;
            let settings = project.settings()?;
            let manifest_obj: Manifest = project.cas.get(&session.manifest)?;
            let prefix = RepoPath::from_internal_string(session.prefix.clone()).map_err(|e| ProjectError::Domain(e.to_string()))?;
            let matcher = manifest::PatternMatcher::from_settings(&project.work_dir, &settings);
            let rows = manifest::status(&manifest_obj, &project.work_dir, &prefix, &matcher)?;
            Ok(CommandOutput::Status(rows))
        }
        "log" => {
            let session = project.active_session()?;
            let registry_id = project.registry_id()?;
            let branch = registry::resolve_branch(&project.cas, &registry_id, &session.branch_uuid)?
                .ok_or_else(|| ProjectError::Domain("active branch not found".into()))?;
            let mut out = Vec::new();
            let mut next = Some(branch.head_commit);
            while let Some(id) = next {
                let commit: Commit = project.cas.get(&id)?;
                out.push(LogLine {
                    commit: id,
                    message: commit.message.clone(),
                    timestamp_applied: commit.timestamp_applied,
                });
                next = commit.parent;
            }
            Ok(CommandOutput::Log(out))
        }
        "undo:list" => {
            let limit = get_single(args, "limit").and_then(|v| v.parse().ok()).unwrap_or(20);
            Ok(CommandOutput::UndoList(action_log::undo_list(&project.cas, &project.scratch, limit).map_err(to_project_error)?))
        }
        "redo:list" => Ok(CommandOutput::RedoList(action_log::redo_list(&project.cas, &project.scratch).map_err(to_project_error)?)),
        other => Err(ProjectError::Usage(format!("unknown command {other:?}"))),
    }
}

fn to_project_error(e: ActionLogError) -> ProjectError {
    match e {
        ActionLogError::Cas(e) => ProjectError::Cas(e),
        ActionLogError::Scratch(e) => ProjectError::Scratch(e),
        ActionLogError::Txn(e) => ProjectError::Txn(e),
        other => ProjectError::Domain(other.to_string()),
    }
}

fn execute_history(project: &Project, cwd: &Path, command: &str, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<CommandOutput> {
    let runner = make_runner(project, cwd);
    match command {
        "undo" => match action_log::undo(&project.cas, &project.scratch, &project.dot_vex, &runner).map_err(to_project_error)? {
            UndoOutcome::Restored(id) => Ok(CommandOutput::Message(format!("undid {}", id.hex()))),
            UndoOutcome::Replayed(id) => Ok(CommandOutput::Message(format!("undid via replay, new head {}", id.hex()))),
        },
        "redo" => {
            let choice = get_single(args, "choice").and_then(|v| v.parse().ok());
            match action_log::redo(&project.cas, &project.scratch, &project.dot_vex, choice, &runner).map_err(to_project_error)? {
                RedoOutcome::Restored(id) => Ok(CommandOutput::Message(format!("redid {}", id.hex()))),
                RedoOutcome::Replayed(id) => Ok(CommandOutput::Message(format!("redid via replay, new head {}", id.hex()))),
                RedoOutcome::NoOp => Ok(CommandOutput::Message("already current".into())),
            }
        }
        other => Err(ProjectError::Usage(format!("unknown history command {other:?}"))),
    }
}

/// The callback `action_log::undo`/`redo` use to replay a logical inverse or
/// a stale redo entry: it re-enters [`execute`] for the named command, which
/// appends a brand-new action the usual way.
pub fn make_runner<'p>(project: &'p Project, cwd: &'p Path) -> impl Fn(&LogicalOp) -> ActionLogResult<ActionId> + 'p {
    move |op: &LogicalOp| {
        let old_head = project.scratch.get(ACTION_LOG_HEAD).map_err(ActionLogError::from)?;
        execute_locked(project, cwd, &op.command, op.args.clone()).map_err(|e| ActionLogError::Command(e.to_string()))?;
        let new_head = project.scratch.get(ACTION_LOG_HEAD).map_err(ActionLogError::from)?;
        match new_head {
            Some(h) if Some(&h) != old_head.as_ref() => Ok(ActionId::from_hex(&h)),
            _ => Err(ActionLogError::Command(format!("{} produced no action to replay", op.command))),
        }
    }
}

/// `dry_run` (spec.md §4.7) suppresses only the working-copy writes of
/// `restore`, `restore:raw`, and `branch:open` — the handlers whose side
/// effects land outside the repository's own CAS/scratch bookkeeping.
/// Every other handler runs identically regardless: their CAS writes are
/// content-addressed and harmless to make even when the caller (`fake`)
/// never commits the resulting pointer deltas.
fn execute_mutating(project: &Project, cwd: &Path, command: &str, args: &std::collections::BTreeMap<String, ArgValue>, dry_run: bool) -> ProjectResult<Staged> {
    match command {
        "init" => handlers::init(project, args),
        "add" => handlers::add(project, cwd, args),
        "forget" => handlers::forget(project, cwd, args),
        "remove" => handlers::remove(project, cwd, args),
        "restore" => handlers::restore(project, cwd, args, dry_run),
        "restore:raw" => handlers::restore_raw(project, args, dry_run),
        "ignore" => handlers::ignore_or_include(project, args, true),
        "include" => handlers::ignore_or_include(project, args, false),
        "commit" => handlers::commit(project, args, CommitVariant::Normal),
        "commit:prepare" => handlers::commit(project, args, CommitVariant::Prepare),
        "commit:amend" => handlers::commit(project, args, CommitVariant::Amend),
        "switch" => handlers::switch(project, args),
        "branch:new" => handlers::branch_new(project, args),
        "branch:saveas" => handlers::branch_saveas(project, args),
        "branch:swap" => handlers::branch_swap(project, args),
        "branch:open" => handlers::branch_open(project, args, dry_run),
        "purge" => handlers::purge(project, args),
        other => Err(ProjectError::Usage(format!("unknown command {other:?}"))),
    }
}

pub(crate) enum CommitVariant {
    Normal,
    Prepare,
    Amend,
}

impl Project {
    /// Like `active_action_registry_hash`, but `None` instead of erroring
    /// when the repository has no registry yet (only true during `init`).
    fn active_action_registry_hash_opt(&self) -> ProjectResult<Option<String>> {
        match self.registry_id() {
            Ok(id) => Ok(Some(id.hex())),
            Err(ProjectError::Domain(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

mod handlers {
    use super::*;

    pub(super) fn init(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let include = get_repeated(args, "include");
        let ignore = get_repeated(args, "ignore");
        let author_uuid = Uuid::new_random();

        let user_config = crate::config::load().unwrap_or_default();
        let authors_table = crate::backend::AuthorsTable {
            authors: std::collections::BTreeMap::from([(
                author_uuid.hex(),
                crate::backend::AuthorInfo {
                    name: user_config.author_name.unwrap_or_else(|| "unknown".into()),
                    email: user_config.author_email.unwrap_or_else(|| "unknown@localhost".into()),
                },
            )]),
        };
        let authors_table_hash = Some(project.cas.put(&authors_table)?.hex());

        let settings_obj = crate::backend::Settings {
            include_patterns: include,
            ignore_patterns: ignore,
            author_uuid: author_uuid.clone(),
            authors_table_hash,
            features: user_config.default_features,
        };
        let settings_id = project.cas.put(&settings_obj)?;

        let empty_tree = commit_mod::build_tree(&project.cas, &std::collections::BTreeMap::new())?;
        let now = Utc::now().timestamp();
        let init_commit = commit_mod::build_commit(&project.cas, None, empty_tree, author_uuid.clone(), now, now, "initial commit".into(), CommitKind::Init)?;

        let name = project.work_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "repo".into());
        let branch_uuid = Uuid::new_random();
        let branch_obj = Branch {
            name: "latest".into(),
            head_commit: init_commit.clone(),
            base_commit: init_commit.clone(),
            upstream_branch_uuid: None,
            uuid: branch_uuid.clone(),
            sealed: false,
        };
        let branch_id = project.cas.put(&branch_obj)?;

        let empty_manifest = project.cas.put(&Manifest::default())?;
        let session_uuid = Uuid::new_random();
        let session_obj = Session {
            uuid: session_uuid.clone(),
            branch_uuid,
            head_commit: init_commit,
            prepared_commit: None,
            manifest: empty_manifest,
            prefix: name,
            mode: SessionMode::Attached,
        };
        let session_id = project.cas.put(&session_obj)?;

        let registry_id = registry::empty(&project.cas)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &session_obj.branch_uuid, branch_id)?;
        let registry_id = registry::with_session(&project.cas, &registry_id, &session_uuid, session_id)?;

        Ok(Staged {
            output: CommandOutput::Unit,
            registry_delta: Some(registry_id),
            settings_delta: Some(settings_id),
            active_session_delta: Some(session_uuid),
            inverse: physical(),
        })
    }

    fn active_triplet(project: &Project) -> ProjectResult<(Session, RegistryId, Branch)> {
        let session = project.active_session()?;
        let registry_id = project.registry_id()?;
        let branch = registry::resolve_branch(&project.cas, &registry_id, &session.branch_uuid)?
            .ok_or_else(|| ProjectError::Domain("active branch not found in registry".into()))?;
        Ok((session, registry_id, branch))
    }

    fn session_prefix(session: &Session) -> ProjectResult<RepoPath> {
        RepoPath::from_internal_string(session.prefix.clone()).map_err(|e| ProjectError::Domain(e.to_string()))
    }

    /// Resolves user-supplied filesystem paths against `work_dir` (which is
    /// already the materialized root of `prefix`), then prepends `prefix` to
    /// get the full repository-wide path used as a manifest key.
    fn resolve_user_paths(cwd: &Path, work_dir: &Path, prefix: &RepoPath, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Vec<RepoPath>> {
        get_repeated(args, "paths")
            .into_iter()
            .map(|p| {
                let relative = RepoPath::parse_fs_path(cwd, work_dir, p).map_err(|e| ProjectError::Domain(e.to_string()))?;
                Ok(prefix.join_path(&relative))
            })
            .collect()
    }

    fn save_session_and_registry(project: &Project, registry_id: &RegistryId, session: Session) -> ProjectResult<RegistryId> {
        let session_id = project.cas.put(&session)?;
        Ok(registry::with_session(&project.cas, registry_id, &session.uuid, session_id)?)
    }

    pub(super) fn add(project: &Project, cwd: &Path, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (mut session, registry_id, _branch) = active_triplet(project)?;
        let prefix = session_prefix(&session)?;
        let paths = resolve_user_paths(cwd, &project.work_dir, &prefix, args)?;
        if paths.is_empty() {
            return Err(ProjectError::Usage("add requires at least one path".into()));
        }
        let manifest_obj: Manifest = project.cas.get(&session.manifest)?;
        let new_manifest = manifest::add_paths(&project.cas, &manifest_obj, &project.work_dir, &prefix, &paths)?;
        session.manifest = project.cas.put(&new_manifest)?;
        let registry_id = save_session_and_registry(project, &registry_id, session)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    pub(super) fn forget(project: &Project, cwd: &Path, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (mut session, registry_id, _branch) = active_triplet(project)?;
        let prefix = session_prefix(&session)?;
        let paths = resolve_user_paths(cwd, &project.work_dir, &prefix, args)?;
        let manifest_obj: Manifest = project.cas.get(&session.manifest)?;
        let new_manifest = manifest::forget_paths(&manifest_obj, &paths);
        session.manifest = project.cas.put(&new_manifest)?;
        let registry_id = save_session_and_registry(project, &registry_id, session)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    /// Encodes `(path, file_id, kind)` triples for `restore:raw`'s args, since
    /// `ArgValue` has no structured-map shape (spec.md §6: "four shapes
    /// only").
    fn encode_entries(entries: &[(RepoPath, ManifestEntry)]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|(path, entry)| {
                let hash = entry.hash.as_deref()?;
                Some(format!("{}\u{1}{}\u{1}{:?}", path.as_internal_str(), hash, entry.kind))
            })
            .collect()
    }

    fn decode_entries(raw: &[String]) -> Vec<(String, String, EntryKind)> {
        raw.iter()
            .filter_map(|line| {
                let mut parts = line.split('\u{1}');
                let path = parts.next()?.to_owned();
                let hash = parts.next()?.to_owned();
                let kind = match parts.next()? {
                    "File" => EntryKind::File,
                    "Link" => EntryKind::Link,
                    "EmptyDir" => EntryKind::EmptyDir,
                    _ => EntryKind::Dir,
                };
                Some((path, hash, kind))
            })
            .collect()
    }

    pub(super) fn remove(project: &Project, cwd: &Path, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (mut session, registry_id, _branch) = active_triplet(project)?;
        let prefix = session_prefix(&session)?;
        let paths = resolve_user_paths(cwd, &project.work_dir, &prefix, args)?;
        let manifest_obj: Manifest = project.cas.get(&session.manifest)?;
        let (new_manifest, removed) = manifest::remove_paths(&manifest_obj, &project.work_dir, &prefix, &paths)?;
        session.manifest = project.cas.put(&new_manifest)?;
        let registry_id = save_session_and_registry(project, &registry_id, session)?;

        let inverse = LogicalOp {
            command: "restore:raw".into(),
            args: std::collections::BTreeMap::from([("entries".to_owned(), ArgValue::Repeated(encode_entries(&removed)))]),
        };
        Ok(unit_with_registry(registry_id, inverse))
    }

    pub(super) fn restore_raw(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>, dry_run: bool) -> ProjectResult<Staged> {
        let (mut session, registry_id, _branch) = active_triplet(project)?;
        let prefix = session_prefix(&session)?;
        let mut manifest_obj: Manifest = project.cas.get(&session.manifest)?;
        for (path_str, hash, kind) in decode_entries(&get_repeated(args, "entries")) {
            let path = RepoPath::from_internal_string(path_str.clone()).map_err(|e| ProjectError::Domain(e.to_string()))?;
            if !dry_run {
                if let Some(suffix) = path.strip_prefix(&prefix) {
                    let fs_path = suffix.to_fs_path(&project.work_dir);
                    if let Some(parent) = fs_path.parent() {
                        crate::file_util::create_dir_all(parent)?;
                    }
                    match kind {
                        EntryKind::File => {
                            let contents = manifest::read_file_contents(&project.cas, &FileId::from_hex(&hash))?;
                            std::fs::write(&fs_path, contents)?;
                        }
                        EntryKind::Link => {
                            let target = manifest::read_file_contents(&project.cas, &FileId::from_hex(&hash))?;
                            let target = String::from_utf8_lossy(&target).into_owned();
                            crate::file_util::try_symlink(target, &fs_path)?;
                        }
                        EntryKind::EmptyDir => crate::file_util::create_dir_all(&fs_path)?,
                        EntryKind::Dir => {}
                    }
                }
            }
            manifest_obj.entries.insert(
                path_str,
                ManifestEntry {
                    kind,
                    hash: Some(hash),
                    properties: Properties::new(),
                    status: TrackStatus::Tracked,
                    mtime: None,
                    size: None,
                },
            );
        }
        session.manifest = project.cas.put(&manifest_obj)?;
        let registry_id = save_session_and_registry(project, &registry_id, session)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    pub(super) fn restore(project: &Project, cwd: &Path, args: &std::collections::BTreeMap<String, ArgValue>, dry_run: bool) -> ProjectResult<Staged> {
        let (session, registry_id, branch) = active_triplet(project)?;
        let prefix = session_prefix(&session)?;
        let paths = resolve_user_paths(cwd, &project.work_dir, &prefix, args)?;

        let manifest_obj: Manifest = project.cas.get(&session.manifest)?;
        let mut pre_overwrite = Vec::new();
        for path in &paths {
            if let Some(entry) = manifest_obj.entries.get(path.as_internal_str()) {
                pre_overwrite.push((path.clone(), entry.clone()));
            }
        }

        if !dry_run {
            let head_commit: Commit = project.cas.get(&branch.head_commit)?;
            let flat = commit_mod::flatten_tree(&project.cas, &head_commit.root_tree)?;
            for path in &paths {
                let Some((kind, hash)) = flat.get(path.as_internal_str()) else { continue };
                let Some(suffix) = path.strip_prefix(&prefix) else { continue };
                let fs_path = suffix.to_fs_path(&project.work_dir);
                if let Some(parent) = fs_path.parent() {
                    crate::file_util::create_dir_all(parent)?;
                }
                match (kind, hash) {
                    (EntryKind::File, Some(h)) => {
                        let contents = manifest::read_file_contents(&project.cas, &FileId::from_hex(h))?;
                        std::fs::write(&fs_path, contents)?;
                    }
                    (EntryKind::Link, Some(h)) => {
                        let target = manifest::read_file_contents(&project.cas, &FileId::from_hex(h))?;
                        let target = String::from_utf8_lossy(&target).into_owned();
                        crate::file_util::try_symlink(target, &fs_path)?;
                    }
                    (EntryKind::EmptyDir, _) => crate::file_util::create_dir_all(&fs_path)?,
                    _ => {}
                }
            }
        }

        let inverse = LogicalOp {
            command: "restore:raw".into(),
            args: std::collections::BTreeMap::from([("entries".to_owned(), ArgValue::Repeated(encode_entries(&pre_overwrite)))]),
        };
        Ok(unit_with_registry(registry_id, inverse))
    }

    pub(super) fn ignore_or_include(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>, is_ignore: bool) -> ProjectResult<Staged> {
        let pattern = get_single(args, "pattern").ok_or_else(|| ProjectError::Usage("missing --pattern".into()))?;
        let settings_hash = project.scratch.get(SETTINGS)?.ok_or_else(|| ProjectError::Domain("no settings; run init first".into()))?;
        let settings_id = crate::object_id::SettingsId::from_hex(&settings_hash);
        let new_id = if is_ignore {
            settings::add_ignore_pattern(&project.cas, &settings_id, pattern)?
        } else {
            settings::add_include_pattern(&project.cas, &settings_id, pattern)?
        };
        Ok(Staged {
            output: CommandOutput::Unit,
            registry_delta: None,
            settings_delta: Some(new_id),
            active_session_delta: None,
            inverse: physical(),
        })
    }

    fn reset_committed_statuses(manifest: &Manifest) -> Manifest {
        let mut updated = manifest.clone();
        updated.entries.retain(|_, e| !matches!(e.status, TrackStatus::Deleted));
        for entry in updated.entries.values_mut() {
            entry.status = TrackStatus::Tracked;
        }
        updated
    }

    pub(super) fn commit(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>, variant: CommitVariant) -> ProjectResult<Staged> {
        let (mut session, registry_id, mut branch) = active_triplet(project)?;
        let settings = project.settings()?;
        let message = get_single(args, "message").ok_or_else(|| ProjectError::Usage("missing --message".into()))?;
        let manifest_obj: Manifest = project.cas.get(&session.manifest)?;

        let has_changes = manifest_obj.entries.values().any(|e| !matches!(e.status, TrackStatus::Tracked | TrackStatus::IgnoredByRule));
        if matches!(variant, CommitVariant::Normal | CommitVariant::Prepare) && !has_changes {
            return Err(ProjectError::Domain("nothing to commit".into()));
        }

        let now = Utc::now().timestamp();
        let (parent, tree, author, written, kind) = match variant {
            CommitVariant::Amend => {
                let old_head: Commit = project.cas.get(&branch.head_commit)?;
                (old_head.parent.clone(), old_head.root_tree.clone(), old_head.author_uuid.clone(), now, CommitKind::Amend)
            }
            _ => {
                let tree = commit_mod::build_tree(&project.cas, &manifest_obj.entries)?;
                (Some(branch.head_commit.clone()), tree, settings.author_uuid.clone(), now, CommitKind::Normal)
            }
        };
        let new_commit = commit_mod::build_commit(&project.cas, parent, tree, author, now, written, message, kind)?;

        match variant {
            CommitVariant::Normal => {
                branch.head_commit = new_commit.clone();
                session.head_commit = new_commit;
                session.prepared_commit = None;
                session.manifest = project.cas.put(&reset_committed_statuses(&manifest_obj))?;
            }
            CommitVariant::Prepare => {
                session.prepared_commit = Some(new_commit);
            }
            CommitVariant::Amend => {
                branch.head_commit = new_commit.clone();
                session.head_commit = new_commit;
            }
        }

        let branch_id = project.cas.put(&branch)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &session.branch_uuid, branch_id)?;
        let registry_id = save_session_and_registry(project, &registry_id, session)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    /// `switch (prefix)`: materializes the subtree rooted at the new prefix
    /// and moves files not under it out of the working copy (spec.md line
    /// 158). The outgoing prefix's dirty edits are folded into the session's
    /// manifest before the working copy is cleared, so switching back to it
    /// (directly, or via `undo`) re-materializes them byte-for-byte.
    pub(super) fn switch(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (mut session, registry_id, _branch) = active_triplet(project)?;
        let new_prefix = get_single(args, "prefix").ok_or_else(|| ProjectError::Usage("missing --prefix".into()))?;
        let old_prefix = session.prefix.clone();

        let manifest_obj: Manifest = project.cas.get(&session.manifest)?;
        let captured = branch::capture_dirty_snapshot(&project.cas, &project.work_dir, &old_prefix, &manifest_obj)?;

        branch::clear_working_copy(&project.work_dir)?;
        branch::materialize(&project.cas, &project.work_dir, &new_prefix, &captured)?;

        session.manifest = project.cas.put(&captured)?;
        session.prefix = new_prefix;

        let registry_id = save_session_and_registry(project, &registry_id, session)?;
        let inverse = LogicalOp {
            command: "switch".into(),
            args: std::collections::BTreeMap::from([("prefix".to_owned(), ArgValue::Single(old_prefix))]),
        };
        Ok(unit_with_registry(registry_id, inverse))
    }

    pub(super) fn branch_new(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (session, registry_id, _branch) = active_triplet(project)?;
        let name = get_single(args, "name").ok_or_else(|| ProjectError::Usage("missing --name".into()))?;
        let existing = registry::all_branches(&project.cas, &registry_id)?.into_iter().map(|(_, b)| b).collect::<Vec<_>>();
        let (new_branch, new_session) = branch::new_branch(&project.cas, &existing, session.head_commit.clone(), name)?;
        let branch_id = project.cas.put(&new_branch)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &new_branch.uuid, branch_id)?;
        let new_session_id = project.cas.put(&new_session)?;
        let registry_id = registry::with_session(&project.cas, &registry_id, &new_session.uuid, new_session_id)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    /// `branch:saveas <name>`: forks a new branch from the *current* session's
    /// in-flight state (including uncommitted edits), without switching to it
    /// (spec.md §8 scenario 3: "`a.py` retains edits" immediately after).
    pub(super) fn branch_saveas(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (session, registry_id, branch) = active_triplet(project)?;
        let name = get_single(args, "name").ok_or_else(|| ProjectError::Usage("missing --name".into()))?;
        let existing = registry::all_branches(&project.cas, &registry_id)?.into_iter().map(|(_, b)| b).collect::<Vec<_>>();
        if existing.iter().any(|b| b.name == name) {
            return Err(ProjectError::Domain(format!("branch {name:?} already exists")));
        }
        let new_branch_uuid = Uuid::new_random();
        let new_branch = Branch {
            name,
            head_commit: session.head_commit.clone(),
            base_commit: branch.base_commit.clone(),
            upstream_branch_uuid: Some(branch.uuid.clone()),
            uuid: new_branch_uuid.clone(),
            sealed: false,
        };
        let branch_id = project.cas.put(&new_branch)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &new_branch_uuid, branch_id)?;

        let new_session = Session {
            uuid: Uuid::new_random(),
            branch_uuid: new_branch_uuid,
            head_commit: session.head_commit.clone(),
            prepared_commit: None,
            manifest: session.manifest.clone(),
            prefix: session.prefix.clone(),
            mode: SessionMode::Detached,
        };
        let new_session_id = project.cas.put(&new_session)?;
        let registry_id = registry::with_session(&project.cas, &registry_id, &new_session.uuid, new_session_id)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    pub(super) fn branch_swap(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let registry_id = project.registry_id()?;
        let a_name = get_single(args, "a").ok_or_else(|| ProjectError::Usage("missing --a".into()))?;
        let b_name = get_single(args, "b").ok_or_else(|| ProjectError::Usage("missing --b".into()))?;
        let (a_uuid, a_branch) = registry::branch_by_name(&project.cas, &registry_id, &a_name)?.ok_or_else(|| ProjectError::Domain(format!("no such branch {a_name:?}")))?;
        let (b_uuid, b_branch) = registry::branch_by_name(&project.cas, &registry_id, &b_name)?.ok_or_else(|| ProjectError::Domain(format!("no such branch {b_name:?}")))?;
        let (a_branch, b_branch) = branch::swap_names(a_branch, b_branch);
        let a_id = project.cas.put(&a_branch)?;
        let b_id = project.cas.put(&b_branch)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &a_uuid, a_id)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &b_uuid, b_id)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    pub(super) fn branch_open(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>, dry_run: bool) -> ProjectResult<Staged> {
        let registry_id = project.registry_id()?;
        let target_name = get_single(args, "name").ok_or_else(|| ProjectError::Usage("missing --name".into()))?;
        let outgoing = project.active_session()?;
        let outgoing_registry = registry::resolve_branch(&project.cas, &registry_id, &outgoing.branch_uuid)?
            .ok_or_else(|| ProjectError::Domain("active branch not found".into()))?;
        let (target_branch_uuid, _target_branch) = registry::branch_by_name(&project.cas, &registry_id, &target_name)?
            .ok_or_else(|| ProjectError::Domain(format!("no such branch {target_name:?}")))?;
        let (_, incoming) = registry::session_for_branch(&project.cas, &registry_id, &target_branch_uuid)?
            .ok_or_else(|| ProjectError::Domain(format!("branch {target_name:?} has no session")))?;

        let (outgoing2, incoming2, _stash) = branch::open_branch(&project.cas, &project.work_dir, &outgoing, &incoming, dry_run)?;
        let outgoing_id = project.cas.put(&outgoing2)?;
        let registry_id = registry::with_session(&project.cas, &registry_id, &outgoing2.uuid, outgoing_id)?;
        let incoming_id = project.cas.put(&incoming2)?;
        let registry_id = registry::with_session(&project.cas, &registry_id, &incoming2.uuid, incoming_id)?;

        let mut staged = unit_with_registry(registry_id, LogicalOp {
            command: "branch:open".into(),
            args: std::collections::BTreeMap::from([("name".to_owned(), ArgValue::Single(outgoing_registry.name))]),
        });
        staged.active_session_delta = Some(incoming2.uuid);
        Ok(staged)
    }

    /// Rewrites every commit on the active branch that touched `path`,
    /// dropping it, and relinks a new parent chain onto the branch head
    /// (spec.md §4.6: "re-emitting commits with the targeted content
    /// removed"). Purged commits are left in the CAS, unreachable from the
    /// new head, per H7.
    pub(super) fn purge(project: &Project, args: &std::collections::BTreeMap<String, ArgValue>) -> ProjectResult<Staged> {
        let (_session, registry_id, mut branch) = active_triplet(project)?;
        let path = get_single(args, "path").ok_or_else(|| ProjectError::Usage("missing --path".into()))?;

        let mut chain = Vec::new();
        let mut next = Some(branch.head_commit.clone());
        while let Some(id) = next {
            let commit: Commit = project.cas.get(&id)?;
            next = commit.parent.clone();
            chain.push(commit);
        }
        chain.reverse();

        let mut new_parent: Option<CommitId> = None;
        let mut new_head = branch.head_commit.clone();
        for commit in chain {
            let flat = commit_mod::flatten_tree(&project.cas, &commit.root_tree)?;
            let entries: std::collections::BTreeMap<String, ManifestEntry> = flat
                .into_iter()
                .filter(|(p, _)| p != &path)
                .map(|(p, (kind, hash))| {
                    (
                        p,
                        ManifestEntry {
                            kind,
                            hash,
                            properties: Properties::new(),
                            status: TrackStatus::Tracked,
                            mtime: None,
                            size: None,
                        },
                    )
                })
                .collect();
            let new_tree = commit_mod::build_tree(&project.cas, &entries)?;
            let new_commit = commit_mod::build_commit(
                &project.cas,
                new_parent.clone(),
                new_tree,
                commit.author_uuid.clone(),
                commit.timestamp_applied,
                commit.timestamp_written,
                commit.message.clone(),
                CommitKind::Replay,
            )?;
            new_parent = Some(new_commit.clone());
            new_head = new_commit;
        }
        branch.head_commit = new_head;
        let branch_id = project.cas.put(&branch)?;
        let registry_id = registry::with_branch(&project.cas, &registry_id, &branch.uuid, branch_id)?;
        Ok(unit_with_registry(registry_id, physical()))
    }

    fn unit_with_registry(registry_id: RegistryId, inverse: LogicalOp) -> Staged {
        Staged {
            output: CommandOutput::Unit,
            registry_delta: Some(registry_id),
            settings_delta: None,
            active_session_delta: None,
            inverse,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn init_args(include: &[&str]) -> std::collections::BTreeMap<String, ArgValue> {
        std::collections::BTreeMap::from([("include".to_owned(), ArgValue::Repeated(include.iter().map(|s| s.to_string()).collect()))])
    }

    fn single(name: &str, value: &str) -> std::collections::BTreeMap<String, ArgValue> {
        std::collections::BTreeMap::from([(name.to_owned(), ArgValue::Single(value.to_owned()))])
    }

    #[test]
    fn init_then_add_then_status_then_undo_then_redo() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.py"), b"print(1)").unwrap();
        let project = Project::scaffold(dir.path()).unwrap();
        execute(&project, dir.path(), "init", init_args(&["*.py"])).unwrap();

        let mut add_args = std::collections::BTreeMap::new();
        add_args.insert("paths".to_owned(), ArgValue::Repeated(vec!["hello.py".to_owned()]));
        execute(&project, dir.path(), "add", add_args).unwrap();

        let CommandOutput::Status(rows) = execute(&project, dir.path(), "status", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected status output");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TrackStatus::Added);

        execute(&project, dir.path(), "undo", std::collections::BTreeMap::new()).unwrap();
        let CommandOutput::Status(rows) = execute(&project, dir.path(), "status", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected status output");
        };
        assert!(rows.is_empty());

        execute(&project, dir.path(), "redo", std::collections::BTreeMap::new()).unwrap();
        let CommandOutput::Status(rows) = execute(&project, dir.path(), "status", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected status output");
        };
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn commit_then_amend_then_undo_restores_old_message() {
        let dir = TempDir::new().unwrap();
        let project = Project::scaffold(dir.path()).unwrap();
        execute(&project, dir.path(), "init", std::collections::BTreeMap::new()).unwrap();
        std::fs::write(dir.path().join("a.py"), b"x").unwrap();
        let mut add_args = std::collections::BTreeMap::new();
        add_args.insert("paths".to_owned(), ArgValue::Repeated(vec!["a.py".to_owned()]));
        execute(&project, dir.path(), "add", add_args).unwrap();
        execute(&project, dir.path(), "commit", single("message", "m1")).unwrap();
        execute(&project, dir.path(), "commit:amend", single("message", "m2")).unwrap();

        let CommandOutput::Log(lines) = execute(&project, dir.path(), "log", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected log output");
        };
        assert_eq!(lines[0].message, "m2");

        execute(&project, dir.path(), "undo", std::collections::BTreeMap::new()).unwrap();
        let CommandOutput::Log(lines) = execute(&project, dir.path(), "log", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected log output");
        };
        assert_eq!(lines[0].message, "m1");
    }

    #[test]
    fn fake_add_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), b"x").unwrap();
        let project = Project::scaffold(dir.path()).unwrap();
        execute(&project, dir.path(), "init", std::collections::BTreeMap::new()).unwrap();

        let mut fake_args = std::collections::BTreeMap::new();
        fake_args.insert("command".to_owned(), ArgValue::Single("add".to_owned()));
        fake_args.insert("paths".to_owned(), ArgValue::Repeated(vec!["a.py".to_owned()]));
        let CommandOutput::Message(msg) = execute(&project, dir.path(), "fake", fake_args).unwrap() else {
            panic!("expected a message");
        };
        assert!(msg.contains("registry"));

        let CommandOutput::Status(rows) = execute(&project, dir.path(), "status", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected status output");
        };
        assert!(rows.is_empty(), "fake add must not actually stage anything: {rows:?}");

        let CommandOutput::UndoList(entries) = execute(&project, dir.path(), "undo:list", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected undo list");
        };
        assert_eq!(entries.len(), 1, "fake must not append to the action log");
        assert_eq!(entries[0].command, "init");
    }

    #[test]
    fn fake_restore_does_not_touch_the_working_copy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), b"x").unwrap();
        let project = Project::scaffold(dir.path()).unwrap();
        execute(&project, dir.path(), "init", std::collections::BTreeMap::new()).unwrap();
        let mut add_args = std::collections::BTreeMap::new();
        add_args.insert("paths".to_owned(), ArgValue::Repeated(vec!["a.py".to_owned()]));
        execute(&project, dir.path(), "add", add_args).unwrap();
        execute(&project, dir.path(), "commit", single("message", "m1")).unwrap();
        std::fs::write(dir.path().join("a.py"), b"edited").unwrap();

        let mut fake_args = std::collections::BTreeMap::new();
        fake_args.insert("command".to_owned(), ArgValue::Single("restore".to_owned()));
        fake_args.insert("paths".to_owned(), ArgValue::Repeated(vec!["a.py".to_owned()]));
        execute(&project, dir.path(), "fake", fake_args).unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.py")).unwrap(), b"edited");
    }

    #[test]
    fn debug_rollback_reports_nothing_to_recover_normally() {
        let dir = TempDir::new().unwrap();
        let project = Project::scaffold(dir.path()).unwrap();
        execute(&project, dir.path(), "init", std::collections::BTreeMap::new()).unwrap();
        let CommandOutput::Message(msg) = execute(&project, dir.path(), "debug:rollback", std::collections::BTreeMap::new()).unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(msg, "nothing to recover");
    }

    #[test]
    fn switch_moves_files_and_undo_redo_round_trip() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), b"x").unwrap();
        let project = Project::scaffold(dir.path()).unwrap();
        execute(&project, dir.path(), "init", std::collections::BTreeMap::new()).unwrap();
        let mut add_args = std::collections::BTreeMap::new();
        add_args.insert("paths".to_owned(), ArgValue::Repeated(vec!["a.py".to_owned()]));
        execute(&project, dir.path(), "add", add_args).unwrap();

        execute(&project, dir.path(), "switch", single("prefix", "sub")).unwrap();
        assert!(!dir.path().join("a.py").exists(), "a.py belongs to the old prefix and must leave the working copy");

        execute(&project, dir.path(), "undo", std::collections::BTreeMap::new()).unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.py")).unwrap(), b"x", "undo must restore the old prefix's files");

        execute(&project, dir.path(), "redo", std::collections::BTreeMap::new()).unwrap();
        assert!(!dir.path().join("a.py").exists(), "redo must re-apply the switch to the new prefix");
    }
}
