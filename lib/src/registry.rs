//! Maps the stable uuid of a branch or session to the hash of its current
//! CAS revision (SPEC_FULL.md §5). Branches and sessions are themselves
//! immutable objects replaced wholesale on every mutation (spec.md H4); the
//! `Registry` is the one piece of mutable indirection that lets a uuid keep
//! meaning "the same branch" across those replacements, the way the
//! teacher's `Operation` points at a `View` snapshot of live refs.
//!
//! The registry's own hash is *not* a scratch pointer: it's reached through
//! the action log head like everything else mutated by a command, via the
//! `"registry"` entry in that command's `ActionRecord.physical`.

use crate::backend::Branch;
use crate::backend::Registry;
use crate::backend::Session;
use crate::cas::Cas;
use crate::cas::CasError;
use crate::object_id::BranchId;
use crate::object_id::RegistryId;
use crate::object_id::SessionId;
use crate::uuid_util::Uuid;

pub fn empty(cas: &Cas) -> Result<RegistryId, CasError> {
    cas.put(&Registry::default())
}

pub fn resolve_branch(cas: &Cas, registry: &RegistryId, uuid: &Uuid) -> Result<Option<Branch>, CasError> {
    let registry: Registry = cas.get(registry)?;
    let Some(id) = registry.branches.get(&uuid.hex()) else {
        return Ok(None);
    };
    Ok(Some(cas.get(id)?))
}

pub fn resolve_session(cas: &Cas, registry: &RegistryId, uuid: &Uuid) -> Result<Option<Session>, CasError> {
    let registry: Registry = cas.get(registry)?;
    let Some(id) = registry.sessions.get(&uuid.hex()) else {
        return Ok(None);
    };
    Ok(Some(cas.get(id)?))
}

/// Writes a new `Branch` revision and returns the registry hash that now
/// points `uuid` at it, leaving every other entry untouched.
pub fn with_branch(cas: &Cas, registry: &RegistryId, uuid: &Uuid, branch_id: BranchId) -> Result<RegistryId, CasError> {
    let mut registry: Registry = cas.get(registry)?;
    registry.branches.insert(uuid.hex(), branch_id);
    cas.put(&registry)
}

/// Writes a new `Session` revision and returns the registry hash that now
/// points `uuid` at it.
pub fn with_session(cas: &Cas, registry: &RegistryId, uuid: &Uuid, session_id: SessionId) -> Result<RegistryId, CasError> {
    let mut registry: Registry = cas.get(registry)?;
    registry.sessions.insert(uuid.hex(), session_id);
    cas.put(&registry)
}

/// Drops a branch from the registry (`branch:close`-style removal, not
/// currently exposed as its own command but kept for `purge`'s
/// reachability sweep to exercise a registry without it).
pub fn without_branch(cas: &Cas, registry: &RegistryId, uuid: &Uuid) -> Result<RegistryId, CasError> {
    let mut registry: Registry = cas.get(registry)?;
    registry.branches.remove(&uuid.hex());
    cas.put(&registry)
}

pub fn all_branches(cas: &Cas, registry: &RegistryId) -> Result<Vec<(Uuid, Branch)>, CasError> {
    let registry: Registry = cas.get(registry)?;
    registry
        .branches
        .into_iter()
        .map(|(uuid_hex, id)| {
            let uuid = Uuid::from_hex(&uuid_hex).expect("registry keys are always valid uuid hex");
            let branch = cas.get(&id)?;
            Ok((uuid, branch))
        })
        .collect()
}

pub fn all_sessions(cas: &Cas, registry: &RegistryId) -> Result<Vec<(Uuid, Session)>, CasError> {
    let registry: Registry = cas.get(registry)?;
    registry
        .sessions
        .into_iter()
        .map(|(uuid_hex, id)| {
            let uuid = Uuid::from_hex(&uuid_hex).expect("registry keys are always valid uuid hex");
            let session = cas.get(&id)?;
            Ok((uuid, session))
        })
        .collect()
}

/// Finds the (currently: single, see `project::branch`'s module doc) session
/// attached to `branch_uuid`.
pub fn session_for_branch(cas: &Cas, registry: &RegistryId, branch_uuid: &Uuid) -> Result<Option<(Uuid, Session)>, CasError> {
    Ok(all_sessions(cas, registry)?.into_iter().find(|(_, s)| &s.branch_uuid == branch_uuid))
}

/// Finds a branch by its current (mutable) name.
pub fn branch_by_name(cas: &Cas, registry: &RegistryId, name: &str) -> Result<Option<(Uuid, Branch)>, CasError> {
    Ok(all_branches(cas, registry)?.into_iter().find(|(_, b)| b.name == name))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::object_id::CommitId;

    fn sample_branch(name: &str, uuid: &Uuid) -> Branch {
        Branch {
            name: name.into(),
            head_commit: CommitId::from_hex("aa"),
            base_commit: CommitId::from_hex("aa"),
            upstream_branch_uuid: None,
            uuid: uuid.clone(),
            sealed: false,
        }
    }

    #[test]
    fn with_branch_then_resolve_round_trips() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let registry = empty(&cas).unwrap();
        let uuid = Uuid::new_random();
        let branch_id = cas.put(&sample_branch("main", &uuid)).unwrap();
        let registry = with_branch(&cas, &registry, &uuid, branch_id).unwrap();
        let resolved = resolve_branch(&cas, &registry, &uuid).unwrap().unwrap();
        assert_eq!(resolved.name, "main");
    }

    #[test]
    fn unknown_uuid_resolves_to_none() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let registry = empty(&cas).unwrap();
        assert!(resolve_branch(&cas, &registry, &Uuid::new_random()).unwrap().is_none());
    }

    #[test]
    fn updating_one_branch_leaves_others_untouched() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let registry = empty(&cas).unwrap();
        let main_uuid = Uuid::new_random();
        let feature_uuid = Uuid::new_random();
        let main_id = cas.put(&sample_branch("main", &main_uuid)).unwrap();
        let registry = with_branch(&cas, &registry, &main_uuid, main_id).unwrap();
        let feature_id = cas.put(&sample_branch("feature", &feature_uuid)).unwrap();
        let registry = with_branch(&cas, &registry, &feature_uuid, feature_id).unwrap();

        let renamed = {
            let mut b = sample_branch("main", &main_uuid);
            b.name = "trunk".into();
            b
        };
        let renamed_id = cas.put(&renamed).unwrap();
        let registry = with_branch(&cas, &registry, &main_uuid, renamed_id).unwrap();

        assert_eq!(resolve_branch(&cas, &registry, &main_uuid).unwrap().unwrap().name, "trunk");
        assert_eq!(resolve_branch(&cas, &registry, &feature_uuid).unwrap().unwrap().name, "feature");
    }
}
