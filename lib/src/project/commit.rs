//! Tree construction, the commit/parent chain, and `commit`,
//! `commit:prepare`, `commit:amend` (spec.md §4.6).

use std::collections::BTreeMap;

use crate::backend::ChangeOp;
use crate::backend::ChangeOpKind;
use crate::backend::ChangelogEntry;
use crate::backend::Commit;
use crate::backend::CommitKind;
use crate::backend::EntryKind;
use crate::backend::ManifestEntry;
use crate::backend::Properties;
use crate::backend::StoredObject as _;
use crate::backend::Tree;
use crate::backend::TrackStatus;
use crate::backend::TreeEntry;
use crate::cas::Cas;
use crate::object_id::ChangelogId;
use crate::object_id::CommitId;
use crate::object_id::ObjectId as _;
use crate::object_id::TreeId;
use crate::project::ProjectResult;

enum Node {
    Leaf { kind: EntryKind, hash: Option<String>, properties: Properties },
    Dir(BTreeMap<String, Node>),
}

fn insert(root: &mut BTreeMap<String, Node>, components: &[&str], leaf: Node) {
    let (first, rest) = components.split_first().expect("at least one path component");
    if rest.is_empty() {
        root.insert((*first).to_owned(), leaf);
        return;
    }
    let entry = root.entry((*first).to_owned()).or_insert_with(|| Node::Dir(BTreeMap::new()));
    if let Node::Dir(children) = entry {
        insert(children, rest, leaf);
    }
}

fn write_tree(cas: &Cas, node: &BTreeMap<String, Node>) -> ProjectResult<TreeId> {
    let mut tree = Tree::default();
    for (name, child) in node {
        let entry = match child {
            Node::Leaf { kind, hash, properties } => TreeEntry {
                kind: *kind,
                target: hash.clone(),
                properties: properties.clone(),
            },
            Node::Dir(children) => {
                let child_id = write_tree(cas, children)?;
                TreeEntry {
                    kind: EntryKind::Dir,
                    target: Some(child_id.hex()),
                    properties: Properties::new(),
                }
            }
        };
        tree.entries.insert(name.clone(), entry);
    }
    Ok(cas.put(&tree)?)
}

/// Builds the canonical `Tree` for everything currently tracked (not
/// `Deleted`) in `entries`, nesting sub-`Tree`s per directory component.
pub fn build_tree(cas: &Cas, entries: &BTreeMap<String, ManifestEntry>) -> ProjectResult<TreeId> {
    let mut root = BTreeMap::new();
    for (path, entry) in entries {
        if matches!(entry.status, TrackStatus::Deleted) {
            continue;
        }
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if components.is_empty() {
            continue;
        }
        insert(
            &mut root,
            &components,
            Node::Leaf {
                kind: entry.kind,
                hash: entry.hash.clone(),
                properties: entry.properties.clone(),
            },
        );
    }
    write_tree(cas, &root)
}

/// Recursively flattens a `Tree` into `path -> (kind, target_hash)`, used to
/// diff against the manifest when building a `ChangelogEntry`.
pub fn flatten_tree(cas: &Cas, tree_id: &TreeId) -> ProjectResult<BTreeMap<String, (EntryKind, Option<String>)>> {
    let mut out = BTreeMap::new();
    flatten_into(cas, tree_id, "", &mut out)?;
    Ok(out)
}

fn flatten_into(cas: &Cas, tree_id: &TreeId, prefix: &str, out: &mut BTreeMap<String, (EntryKind, Option<String>)>) -> ProjectResult<()> {
    let tree: Tree = cas.get(tree_id)?;
    for (name, entry) in &tree.entries {
        let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
        match entry.kind {
            EntryKind::Dir => {
                let child_id = TreeId::from_hex(entry.target.as_deref().expect("dir entry has target"));
                flatten_into(cas, &child_id, &path, out)?;
            }
            _ => {
                out.insert(path, (entry.kind, entry.target.clone()));
            }
        }
    }
    Ok(())
}

/// Diffs the previous commit's tree against the tree about to be committed,
/// producing the `ChangelogEntry` ops spec.md §3 describes ("used for fast
/// log and diff without tree walks").
pub fn build_changelog(cas: &Cas, prev_changelog: Option<ChangelogId>, old_tree: Option<&TreeId>, new_tree: &TreeId) -> ProjectResult<ChangelogId> {
    let old_flat = match old_tree {
        Some(id) => flatten_tree(cas, id)?,
        None => BTreeMap::new(),
    };
    let new_flat = flatten_tree(cas, new_tree)?;

    let mut ops = Vec::new();
    for (path, (_, new_hash)) in &new_flat {
        match old_flat.get(path) {
            None => ops.push(ChangeOp {
                path: path.clone(),
                kind: ChangeOpKind::Added,
            }),
            Some((_, old_hash)) if old_hash != new_hash => ops.push(ChangeOp {
                path: path.clone(),
                kind: ChangeOpKind::Modified,
            }),
            Some(_) => {}
        }
    }
    for path in old_flat.keys() {
        if !new_flat.contains_key(path) {
            ops.push(ChangeOp {
                path: path.clone(),
                kind: ChangeOpKind::Removed,
            });
        }
    }
    Ok(cas.put(&ChangelogEntry { prev: prev_changelog, ops })?)
}

/// Builds the `Commit` object for `commit`/`commit:prepare`/`commit:amend`.
/// `parent` is the commit this one's history chains from (for `commit:amend`
/// this is the *grandparent*, skipping the amended commit per spec.md
/// §4.6). `timestamp_applied` must be non-decreasing along the parent chain
/// (H5); callers pass `max(now, parent.timestamp_applied)`.
#[allow(clippy::too_many_arguments)]
pub fn build_commit(
    cas: &Cas,
    parent: Option<CommitId>,
    new_tree: TreeId,
    author_uuid: crate::uuid_util::Uuid,
    now: i64,
    timestamp_written: i64,
    message: String,
    kind: CommitKind,
) -> ProjectResult<CommitId> {
    let parent_commit: Option<Commit> = match &parent {
        Some(id) => Some(cas.get(id)?),
        None => None,
    };
    let old_tree = parent_commit.as_ref().map(|c| &c.root_tree);
    let prev_changelog = parent_commit.as_ref().map(|c| c.changelog_entry.clone());
    let changelog_entry = build_changelog(cas, prev_changelog, old_tree, &new_tree)?;
    let timestamp_applied = match &parent_commit {
        Some(c) => now.max(c.timestamp_applied),
        None => now,
    };
    Ok(cas.put(&Commit {
        parent,
        root_tree: new_tree,
        author_uuid,
        timestamp_applied,
        timestamp_written,
        message,
        changelog_entry,
        kind,
    })?)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::backend::Manifest;

    fn entry(kind: EntryKind, hash: Option<&str>) -> ManifestEntry {
        ManifestEntry {
            kind,
            hash: hash.map(str::to_owned),
            properties: Properties::new(),
            status: TrackStatus::Added,
            mtime: None,
            size: None,
        }
    }

    #[test]
    fn build_tree_nests_directories() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let mut manifest = Manifest::default();
        manifest.entries.insert("a/b.py".into(), entry(EntryKind::File, Some("ff")));
        manifest.entries.insert("c.py".into(), entry(EntryKind::File, Some("ee")));
        let tree_id = build_tree(&cas, &manifest.entries).unwrap();
        let flat = flatten_tree(&cas, &tree_id).unwrap();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["a/b.py"].1.as_deref(), Some("ff"));
        assert_eq!(flat["c.py"].1.as_deref(), Some("ee"));
    }

    #[test]
    fn changelog_reports_added_and_removed() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let mut manifest = Manifest::default();
        manifest.entries.insert("a.py".into(), entry(EntryKind::File, Some("aa")));
        let tree1 = build_tree(&cas, &manifest.entries).unwrap();

        manifest.entries.remove("a.py");
        manifest.entries.insert("b.py".into(), entry(EntryKind::File, Some("bb")));
        let tree2 = build_tree(&cas, &manifest.entries).unwrap();

        let changelog_id = build_changelog(&cas, None, Some(&tree1), &tree2).unwrap();
        let changelog: ChangelogEntry = cas.get(&changelog_id).unwrap();
        let kinds: Vec<_> = changelog.ops.iter().map(|op| (op.path.as_str(), op.kind)).collect();
        assert!(kinds.contains(&("b.py", ChangeOpKind::Added)));
        assert!(kinds.contains(&("a.py", ChangeOpKind::Removed)));
    }
}
