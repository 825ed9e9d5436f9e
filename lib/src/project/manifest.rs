//! Working-copy scanning, include/ignore matching, and the manifest
//! mutations behind `add`/`forget`/`remove`/`status` (spec.md §4.6).

use std::collections::BTreeMap;
use std::path::Path;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;

use crate::backend::Blob;
use crate::backend::EntryKind;
use crate::backend::File;
use crate::backend::Manifest;
use crate::backend::ManifestEntry;
use crate::backend::Properties;
use crate::backend::Settings;
use crate::backend::StoredObject as _;
use crate::backend::TrackStatus;
use crate::backend::encode_blob;
use crate::cas::Cas;
use crate::object_id::FileId;
use crate::object_id::ObjectId as _;
use crate::project::ProjectError;
use crate::project::ProjectResult;
use crate::repo_path::RepoPath;

/// Matches a repository-relative path against a `Settings`'s include/ignore
/// pattern lists, in the teacher's `ignore` crate idiom (spec.md §3's
/// `Settings.include_patterns`/`ignore_patterns`).
pub struct PatternMatcher {
    include: Option<Gitignore>,
    ignore: Gitignore,
}

impl PatternMatcher {
    pub fn from_settings(root: &Path, settings: &Settings) -> Self {
        let build = |patterns: &[String]| {
            let mut builder = GitignoreBuilder::new(root);
            for pattern in patterns {
                let _ = builder.add_line(None, pattern);
            }
            builder.build().unwrap_or_else(|_| GitignoreBuilder::new(root).build().unwrap())
        };
        let include = (!settings.include_patterns.is_empty()).then(|| build(&settings.include_patterns));
        let ignore = build(&settings.ignore_patterns);
        Self { include, ignore }
    }

    /// Whether `path` should be considered for tracking at all (used while
    /// scanning the working copy; already-tracked paths are tracked
    /// regardless, matching "ignore only applies to untracked paths").
    pub fn is_trackable(&self, path: &Path, is_dir: bool) -> bool {
        if self.ignore.matched(path, is_dir).is_ignore() {
            return false;
        }
        match &self.include {
            Some(include) => include.matched(path, is_dir).is_ignore(),
            None => true,
        }
    }
}

/// One file found on disk during a working-copy scan.
pub struct DiskEntry {
    pub kind: EntryKind,
    pub contents: Option<Vec<u8>>,
    pub mtime: Option<i64>,
    pub size: Option<u64>,
}

fn mtime_secs(meta: &std::fs::Metadata) -> Option<i64> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

/// Walks the working copy under `work_dir`, honoring `matcher`, and returns
/// every discoverable path's on-disk state keyed by its full repository path
/// (`prefix` prepended to each path found under `work_dir`). Empty
/// directories are reported as first-class entries (spec.md §3: "Empty
/// directories are first-class").
pub fn scan_working_copy(work_dir: &Path, prefix: &RepoPath, matcher: &PatternMatcher) -> std::io::Result<BTreeMap<RepoPath, DiskEntry>> {
    let mut out = BTreeMap::new();
    if !work_dir.is_dir() {
        return Ok(out);
    }
    scan_dir(work_dir, prefix, matcher, &mut out)?;
    Ok(out)
}

fn scan_dir(dir: &Path, repo_dir: &RepoPath, matcher: &PatternMatcher, out: &mut BTreeMap<RepoPath, DiskEntry>) -> std::io::Result<()> {
    let mut saw_entry = false;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else { continue };
        if name == ".vex" {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        let child_repo_path = repo_dir.join(name);
        if !matcher.is_trackable(&path, file_type.is_dir()) {
            continue;
        }
        saw_entry = true;
        if file_type.is_dir() {
            scan_dir(&path, &child_repo_path, matcher, out)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&path)?.to_string_lossy().into_owned();
            out.insert(
                child_repo_path,
                DiskEntry {
                    kind: EntryKind::Link,
                    contents: Some(target.into_bytes()),
                    mtime: None,
                    size: None,
                },
            );
        } else {
            let meta = entry.metadata()?;
            let contents = std::fs::read(&path)?;
            out.insert(
                child_repo_path,
                DiskEntry {
                    kind: EntryKind::File,
                    size: Some(meta.len()),
                    mtime: mtime_secs(&meta),
                    contents: Some(contents),
                },
            );
        }
    }
    if !saw_entry && !repo_dir.is_root() {
        out.insert(
            repo_dir.clone(),
            DiskEntry {
                kind: EntryKind::EmptyDir,
                contents: None,
                mtime: None,
                size: None,
            },
        );
    }
    Ok(())
}

/// Writes a `Blob`+`File` pair for disk contents, returning the `File` id to
/// embed as a manifest/tree entry hash.
pub fn store_file(cas: &Cas, contents: &[u8], properties: Properties) -> ProjectResult<FileId> {
    let blob_stored = encode_blob(contents);
    let blob_hash = cas.write_raw(&blob_stored)?;
    let blob_id = crate::object_id::BlobId::from_hex(&blob_hash);
    Ok(cas.put(&File { blob: blob_id, properties })?)
}

pub fn read_file_contents(cas: &Cas, file_id: &FileId) -> ProjectResult<Vec<u8>> {
    let file: File = cas.get(file_id)?;
    let stored = cas.read_raw(&file.blob.hex())?;
    let blob: Blob = crate::backend::decode_blob(&stored).map_err(crate::cas::CasError::from)?;
    Ok(blob.contents)
}

/// `add <paths>`: stages disk contents into the manifest as `Added` (or
/// `Modified` if already tracked), writing `Blob`/`File` objects along the
/// way. Returns the new manifest.
pub fn add_paths(cas: &Cas, manifest: &Manifest, work_dir: &Path, prefix: &RepoPath, paths: &[RepoPath]) -> ProjectResult<Manifest> {
    let mut manifest = manifest.clone();
    for path in paths {
        let suffix = path
            .strip_prefix(prefix)
            .ok_or_else(|| ProjectError::Domain(format!("{path}: not under prefix {prefix}")))?;
        let fs_path = suffix.to_fs_path(work_dir);
        let meta = std::fs::symlink_metadata(&fs_path)
            .map_err(|_| ProjectError::Domain(format!("{path}: no such file")))?;
        let (kind, contents, size, mtime) = if meta.is_dir() {
            (EntryKind::EmptyDir, None, None, None)
        } else if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&fs_path)?.to_string_lossy().into_owned();
            (EntryKind::Link, Some(target.into_bytes()), None, None)
        } else {
            (EntryKind::File, Some(std::fs::read(&fs_path)?), Some(meta.len()), mtime_secs(&meta))
        };
        let hash = match &contents {
            Some(bytes) => Some(store_file(cas, bytes, Properties::new())?.hex()),
            None => None,
        };
        let status = if manifest.entries.contains_key(path.as_internal_str()) {
            TrackStatus::Modified
        } else {
            TrackStatus::Added
        };
        manifest.entries.insert(
            path.as_internal_str().to_owned(),
            ManifestEntry {
                kind,
                hash,
                properties: Properties::new(),
                status,
                mtime,
                size,
            },
        );
    }
    Ok(manifest)
}

/// `forget <paths>`: removes paths from tracking without touching disk.
pub fn forget_paths(manifest: &Manifest, paths: &[RepoPath]) -> Manifest {
    let mut manifest = manifest.clone();
    for path in paths {
        manifest.entries.remove(path.as_internal_str());
    }
    manifest
}

/// `remove <paths>`: untracks and deletes from disk. Returns the entries
/// removed, so the caller can build a logical inverse that knows which blobs
/// to restore.
pub fn remove_paths(manifest: &Manifest, work_dir: &Path, prefix: &RepoPath, paths: &[RepoPath]) -> ProjectResult<(Manifest, Vec<(RepoPath, ManifestEntry)>)> {
    let mut manifest = manifest.clone();
    let mut removed = Vec::new();
    for path in paths {
        if let Some(entry) = manifest.entries.remove(path.as_internal_str()) {
            let suffix = path
                .strip_prefix(prefix)
                .ok_or_else(|| ProjectError::Domain(format!("{path}: not under prefix {prefix}")))?;
            let fs_path = suffix.to_fs_path(work_dir);
            match std::fs::remove_file(&fs_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            removed.push((path.clone(), entry));
        }
    }
    Ok((manifest, removed))
}

/// One row of `status` output.
#[derive(Debug)]
pub struct StatusEntry {
    pub path: RepoPath,
    pub status: TrackStatus,
}

/// Computes `status` by comparing the manifest against disk. Untracked
/// trackable paths are reported with `Added`-shaped semantics only once
/// `add` has run; here they're simply absent from the manifest and thus not
/// listed (matching spec.md scenario 1: "untracked" means "not in the
/// report" until `add`).
pub fn status(manifest: &Manifest, work_dir: &Path, prefix: &RepoPath, matcher: &PatternMatcher) -> ProjectResult<Vec<StatusEntry>> {
    let disk = scan_working_copy(work_dir, prefix, matcher)?;
    let mut out = Vec::new();
    for (path_str, entry) in &manifest.entries {
        let path = RepoPath::from_internal_string(path_str.clone()).expect("manifest keys are valid repo paths");
        let current_status = match disk.get(&path) {
            None => TrackStatus::Deleted,
            Some(_) if entry.status == TrackStatus::Added => TrackStatus::Added,
            Some(_) => TrackStatus::Tracked,
        };
        out.push(StatusEntry { path, status: current_status });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::cas::Cas;

    #[test]
    fn add_then_status_reports_added() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.py"), b"print(1)").unwrap();
        let cas_dir = TempDir::new().unwrap();
        let cas = Cas::init(cas_dir.path()).unwrap();
        let settings = Settings {
            include_patterns: vec![],
            ignore_patterns: vec![],
            author_uuid: crate::uuid_util::Uuid::new_random(),
            authors_table_hash: None,
            features: vec![],
        };
        let matcher = PatternMatcher::from_settings(dir.path(), &settings);
        let path = RepoPath::from_internal_string("hello.py").unwrap();
        let manifest = add_paths(&cas, &Manifest::default(), dir.path(), &RepoPath::root(), &[path.clone()]).unwrap();
        assert_eq!(manifest.entries[path.as_internal_str()].status, TrackStatus::Added);

        let rows = status(&manifest, dir.path(), &RepoPath::root(), &matcher).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TrackStatus::Added);
    }

    #[test]
    fn forget_removes_tracking_but_not_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), b"x").unwrap();
        let cas_dir = TempDir::new().unwrap();
        let cas = Cas::init(cas_dir.path()).unwrap();
        let path = RepoPath::from_internal_string("a.py").unwrap();
        let manifest = add_paths(&cas, &Manifest::default(), dir.path(), &RepoPath::root(), &[path.clone()]).unwrap();
        let manifest = forget_paths(&manifest, &[path]);
        assert!(manifest.entries.is_empty());
        assert!(dir.path().join("a.py").is_file());
    }

    #[test]
    fn remove_deletes_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), b"x").unwrap();
        let cas_dir = TempDir::new().unwrap();
        let cas = Cas::init(cas_dir.path()).unwrap();
        let path = RepoPath::from_internal_string("a.py").unwrap();
        let manifest = add_paths(&cas, &Manifest::default(), dir.path(), &RepoPath::root(), &[path.clone()]).unwrap();
        let (manifest, removed) = remove_paths(&manifest, dir.path(), &RepoPath::root(), &[path]).unwrap();
        assert!(manifest.entries.is_empty());
        assert_eq!(removed.len(), 1);
        assert!(!dir.path().join("a.py").exists());
    }
}
