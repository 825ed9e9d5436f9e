//! Branches, sessions, and the stash protocol that lets `branch:open`
//! preserve uncommitted work across a switch (spec.md §4.6).
//!
//! Simplification from spec.md's general shape (documented in DESIGN.md):
//! this crate keeps exactly one `Session` per `Branch` rather than letting
//! several sessions share one, since nothing in spec.md §8's scenarios
//! exercises multiple sessions on the same branch. A session's own
//! `manifest` field already carries its last-known dirty working-copy
//! state, so capturing/restoring a stash is "snapshot current disk bytes
//! into the session's manifest" / "write the target session's manifest back
//! to disk" rather than a separate stash history.

use std::path::Path;
use std::path::PathBuf;

use crate::backend::Branch;
use crate::backend::EntryKind;
use crate::backend::Manifest;
use crate::backend::Session;
use crate::backend::SessionMode;
use crate::backend::StashEntry;
use crate::backend::StoredObject as _;
use crate::backend::TrackStatus;
use crate::cas::Cas;
use crate::object_id::CommitId;
use crate::object_id::FileId;
use crate::object_id::ObjectId as _;
use crate::object_id::SessionId;
use crate::project::ProjectError;
use crate::project::ProjectResult;
use crate::project::manifest;
use crate::repo_path::RepoPath;
use crate::uuid_util::Uuid;

/// Resolves a manifest entry's repo-internal path to its location on disk.
/// `work_dir` is already the materialized root of `prefix`, so only the part
/// of `path` past `prefix` is meaningful on disk; entries outside `prefix`
/// (tracked in the branch but not part of the checked-out subtree) have no
/// disk location and are skipped by the caller.
fn to_disk_path(work_dir: &Path, prefix: &RepoPath, path: &RepoPath) -> Option<PathBuf> {
    Some(path.strip_prefix(prefix)?.to_fs_path(work_dir))
}

/// Removes everything under `work_dir` except `.vex`, so a prefix switch
/// starts from a clean slate before [`materialize`] writes out the new
/// prefix's files (spec.md §4.6: "move files not under the new prefix out of
/// the working copy").
pub fn clear_working_copy(work_dir: &Path) -> ProjectResult<()> {
    let Ok(entries) = std::fs::read_dir(work_dir) else {
        return Ok(());
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_name() == ".vex" {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Re-reads every tracked file's disk bytes and updates the manifest's
/// stored hashes to match, so leaving a branch never silently drops
/// uncommitted edits.
pub fn capture_dirty_snapshot(cas: &Cas, work_dir: &Path, prefix: &str, manifest: &Manifest) -> ProjectResult<Manifest> {
    let prefix = RepoPath::from_internal_string(prefix.to_owned()).map_err(|e| ProjectError::Domain(e.to_string()))?;
    let mut updated = manifest.clone();
    for (path_str, entry) in &manifest.entries {
        if matches!(entry.status, TrackStatus::Deleted) {
            continue;
        }
        let path = RepoPath::from_internal_string(path_str.clone())
            .map_err(|e| ProjectError::Domain(e.to_string()))?;
        let Some(fs_path) = to_disk_path(work_dir, &prefix, &path) else { continue };
        let updated_entry = updated.entries.get_mut(path_str).expect("key from same map");
        match entry.kind {
            EntryKind::File => match std::fs::read(&fs_path) {
                Ok(bytes) => updated_entry.hash = Some(manifest::store_file(cas, &bytes, entry.properties.clone())?.hex()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => updated_entry.status = TrackStatus::Deleted,
                Err(e) => return Err(e.into()),
            },
            EntryKind::Link | EntryKind::EmptyDir | EntryKind::Dir => {}
        }
    }
    Ok(updated)
}

/// Writes every tracked entry in `manifest` to disk under `prefix`,
/// overwriting whatever was materialized for a previously active session.
pub fn materialize(cas: &Cas, work_dir: &Path, prefix: &str, manifest: &Manifest) -> ProjectResult<()> {
    let prefix = RepoPath::from_internal_string(prefix.to_owned()).map_err(|e| ProjectError::Domain(e.to_string()))?;
    for (path_str, entry) in &manifest.entries {
        if matches!(entry.status, TrackStatus::Deleted) {
            continue;
        }
        let path = RepoPath::from_internal_string(path_str.clone())
            .map_err(|e| ProjectError::Domain(e.to_string()))?;
        let Some(fs_path) = to_disk_path(work_dir, &prefix, &path) else { continue };
        if let Some(parent) = fs_path.parent() {
            crate::file_util::create_dir_all(parent)?;
        }
        match entry.kind {
            EntryKind::File => {
                if let Some(hash) = &entry.hash {
                    let file_id = FileId::from_hex(hash);
                    let contents = manifest::read_file_contents(cas, &file_id)?;
                    std::fs::write(&fs_path, contents)?;
                }
            }
            EntryKind::Link => {
                if let Some(hash) = &entry.hash {
                    let file_id = FileId::from_hex(hash);
                    let target = manifest::read_file_contents(cas, &file_id)?;
                    let target = String::from_utf8_lossy(&target).into_owned();
                    let _ = std::fs::remove_file(&fs_path);
                    crate::file_util::try_symlink(target, &fs_path)?;
                }
            }
            EntryKind::EmptyDir => {
                crate::file_util::create_dir_all(&fs_path)?;
            }
            EntryKind::Dir => {}
        }
    }
    Ok(())
}

/// `branch:new <name>`: creates a branch forked from `base_commit`, with its
/// own session, but does not switch the active session to it.
pub fn new_branch(cas: &Cas, existing: &[Branch], base_commit: CommitId, name: String) -> ProjectResult<(Branch, Session)> {
    if existing.iter().any(|b| b.name == name) {
        return Err(ProjectError::Domain(format!("branch {name:?} already exists")));
    }
    let branch_uuid = Uuid::new_random();
    let branch = Branch {
        name,
        head_commit: base_commit.clone(),
        base_commit,
        upstream_branch_uuid: None,
        uuid: branch_uuid.clone(),
        sealed: false,
    };
    let empty_manifest = cas.put(&Manifest::default())?;
    let session = Session {
        uuid: Uuid::new_random(),
        branch_uuid,
        head_commit: branch.head_commit.clone(),
        prepared_commit: None,
        manifest: empty_manifest,
        prefix: String::new(),
        mode: SessionMode::Detached,
    };
    Ok((branch, session))
}

/// `branch:swap`: exchanges the `name` field of two branches, leaving their
/// uuids and heads untouched (spec.md §4.6: "Inverse: physical (swap
/// back)").
pub fn swap_names(mut a: Branch, mut b: Branch) -> (Branch, Branch) {
    std::mem::swap(&mut a.name, &mut b.name);
    (a, b)
}

/// Captures the outgoing session's dirty state to disk-backed hashes,
/// builds a `StashEntry` recording it (the record spec.md §3 names for a
/// branch switch's cached uncommitted state), clears the working copy, and
/// materializes the incoming session's manifest onto disk. Returns the
/// outgoing session updated to point at its freshly captured manifest.
///
/// `dry_run` skips the actual working-copy changes (spec.md §4.7: `fake`
/// guards a command's outside-the-repository side effects), while still
/// computing and returning the sessions `fake` needs to report what it
/// would have written.
pub fn open_branch(cas: &Cas, work_dir: &Path, outgoing: &Session, incoming: &Session, dry_run: bool) -> ProjectResult<(Session, Session, StashEntry)> {
    let outgoing_manifest: Manifest = cas.get(&outgoing.manifest)?;
    let captured = capture_dirty_snapshot(cas, work_dir, &outgoing.prefix, &outgoing_manifest)?;
    let captured_id = cas.put(&captured)?;
    let stash = StashEntry {
        session_uuid: outgoing.uuid.clone(),
        manifest: captured_id.clone(),
        unsaved_blobs: dirty_blob_ids(&captured),
    };
    let mut outgoing = outgoing.clone();
    outgoing.manifest = captured_id;

    let incoming = incoming.clone();
    let incoming_manifest: Manifest = cas.get(&incoming.manifest)?;
    if !dry_run {
        clear_working_copy(work_dir)?;
        materialize(cas, work_dir, &incoming.prefix, &incoming_manifest)?;
    }

    Ok((outgoing, incoming, stash))
}

fn dirty_blob_ids(manifest: &Manifest) -> Vec<FileId> {
    manifest
        .entries
        .values()
        .filter(|e| matches!(e.kind, EntryKind::File | EntryKind::Link))
        .filter_map(|e| e.hash.as_deref())
        .map(FileId::from_hex)
        .collect()
}

pub fn resolve_session_id(cas: &Cas, session: &Session) -> ProjectResult<SessionId> {
    Ok(cas.put(session)?)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::backend::ManifestEntry;
    use crate::backend::Properties;

    fn sample_session(uuid: Uuid, prefix: &str, manifest: crate::object_id::ManifestId) -> Session {
        Session {
            uuid,
            branch_uuid: Uuid::new_random(),
            head_commit: CommitId::from_hex("aa"),
            prepared_commit: None,
            manifest,
            prefix: prefix.to_owned(),
            mode: SessionMode::Attached,
        }
    }

    #[test]
    fn branch_switch_round_trips_uncommitted_edits() {
        let dir = TempDir::new().unwrap();
        let cas_dir = TempDir::new().unwrap();
        let cas = Cas::init(cas_dir.path()).unwrap();

        std::fs::write(dir.path().join("a.py"), b"original").unwrap();
        let mut manifest_a = Manifest::default();
        let hash = manifest::store_file(&cas, b"original", Properties::new()).unwrap().hex();
        manifest_a.entries.insert(
            "a.py".into(),
            ManifestEntry {
                kind: EntryKind::File,
                hash: Some(hash),
                properties: Properties::new(),
                status: TrackStatus::Tracked,
                mtime: None,
                size: None,
            },
        );
        let manifest_a_id = cas.put(&manifest_a).unwrap();
        let session_a = sample_session(Uuid::new_random(), "", manifest_a_id);

        let empty_manifest_id = cas.put(&Manifest::default()).unwrap();
        let session_b = sample_session(Uuid::new_random(), "", empty_manifest_id);

        std::fs::write(dir.path().join("a.py"), b"edited").unwrap();
        let (_outgoing, _incoming, stash) = open_branch(&cas, dir.path(), &session_a, &session_b, false).unwrap();
        assert!(!dir.path().join("a.py").exists() || std::fs::read(dir.path().join("a.py")).unwrap() != b"edited");

        let captured: Manifest = cas.get(&stash.manifest).unwrap();
        let back_session = sample_session(session_a.uuid.clone(), "", cas.put(&captured).unwrap());
        materialize(&cas, dir.path(), &back_session.prefix, &captured).unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.py")).unwrap(), b"edited");
    }
}
