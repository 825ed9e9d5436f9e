//! Repository-relative paths used by the working copy and [`crate::backend`]
//! trees/manifests (spec.md §3, §4.6). Always `/`-separated internally,
//! regardless of platform.

use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::file_util;

/// A `/`-separated path relative to the repository root. The root itself is
/// represented by the empty string.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoPath(String);

#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("invalid repository path {value:?}")]
pub struct InvalidRepoPathError {
    value: String,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FsPathParseError {
    #[error("path {path} is not valid UTF-8")]
    InvalidUtf8 { path: PathBuf },
    #[error("path {path} contains a component outside the repository root")]
    EscapesRoot { path: PathBuf },
}

impl RepoPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_internal_string(value: impl Into<String>) -> Result<Self, InvalidRepoPathError> {
        let value = value.into();
        if value.starts_with('/') || value.ends_with('/') || value.contains("//") {
            return Err(InvalidRepoPathError { value });
        }
        Ok(Self(value))
    }

    /// Parses a filesystem path (absolute or relative to `cwd`) into a path
    /// relative to the repository root `base`. Both `cwd` and `base` must be
    /// absolute and normalized consistently.
    pub fn parse_fs_path(cwd: &Path, base: &Path, input: impl AsRef<Path>) -> Result<Self, FsPathParseError> {
        let input = input.as_ref();
        let abs_input = file_util::normalize_path(&cwd.join(input));
        let relative = file_util::relative_path(base, &abs_input);
        let mut value = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| FsPathParseError::InvalidUtf8 {
                        path: input.to_owned(),
                    })?;
                    if !value.is_empty() {
                        value.push('/');
                    }
                    value.push_str(name);
                }
                Component::CurDir => {}
                _ => {
                    return Err(FsPathParseError::EscapesRoot {
                        path: input.to_owned(),
                    });
                }
            }
        }
        Ok(Self(value))
    }

    pub fn as_internal_str(&self) -> &str {
        &self.0
    }

    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        let mut result = base.to_path_buf();
        if !self.0.is_empty() {
            result.extend(self.0.split('/'));
        }
        result
    }

    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components().next_back()
    }

    pub fn parent(&self) -> Option<Self> {
        let (parent, _) = self.0.rsplit_once('/')?;
        Some(Self(parent.to_owned()))
    }

    pub fn join(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_owned())
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    pub fn starts_with(&self, base: &Self) -> bool {
        if base.0.is_empty() {
            return true;
        }
        self.0 == base.0 || self.0.starts_with(&format!("{}/", base.0))
    }

    /// Prepends `self` onto `other`, treating `other` as relative to `self`.
    /// Used to turn a path resolved relative to the working copy into a
    /// full repository-wide path under a session's prefix.
    pub fn join_path(&self, other: &Self) -> Self {
        if other.0.is_empty() {
            self.clone()
        } else if self.0.is_empty() {
            other.clone()
        } else {
            Self(format!("{}/{}", self.0, other.0))
        }
    }

    /// The inverse of [`Self::join_path`]: returns the part of `self` after
    /// `base`, or `None` if `self` does not lie under `base`.
    pub fn strip_prefix(&self, base: &Self) -> Option<Self> {
        if base.0.is_empty() {
            return Some(self.clone());
        }
        if self.0 == base.0 {
            Some(Self::root())
        } else {
            self.0.strip_prefix(&format!("{}/", base.0)).map(|s| Self(s.to_owned()))
        }
    }
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(".")
        } else {
            f.write_str(&self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rp(value: &str) -> RepoPath {
        RepoPath::from_internal_string(value).unwrap()
    }

    #[test]
    fn is_root() {
        assert!(RepoPath::root().is_root());
        assert!(rp("").is_root());
        assert!(!rp("foo").is_root());
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(RepoPath::from_internal_string("/x").is_err());
        assert!(RepoPath::from_internal_string("x/").is_err());
        assert!(RepoPath::from_internal_string("x//y").is_err());
    }

    #[test]
    fn join_and_parent() {
        let dir = RepoPath::root().join("dir");
        let file = dir.join("file");
        assert_eq!(file.as_internal_str(), "dir/file");
        assert_eq!(file.parent(), Some(dir.clone()));
        assert_eq!(dir.parent(), Some(RepoPath::root()));
        assert_eq!(RepoPath::root().parent(), None);
    }

    #[test]
    fn starts_with_checks_prefix_components() {
        assert!(rp("dir/sub").starts_with(&rp("dir")));
        assert!(!rp("dirx").starts_with(&rp("dir")));
        assert!(rp("anything").starts_with(&RepoPath::root()));
    }

    #[test]
    fn join_path_and_strip_prefix_round_trip() {
        let prefix = rp("sub");
        let relative = rp("dir/file");
        let full = prefix.join_path(&relative);
        assert_eq!(full.as_internal_str(), "sub/dir/file");
        assert_eq!(full.strip_prefix(&prefix), Some(relative.clone()));
        assert_eq!(RepoPath::root().join_path(&relative), relative);
        assert_eq!(rp("other").strip_prefix(&prefix), None);
        assert_eq!(full.strip_prefix(&RepoPath::root()), Some(full.clone()));
    }

    #[test]
    fn parse_fs_path_relative_to_base() {
        let cwd = Path::new("/repo/sub");
        let base = Path::new("/repo");
        assert_eq!(
            RepoPath::parse_fs_path(cwd, base, "file.txt").unwrap(),
            rp("sub/file.txt")
        );
        assert_eq!(RepoPath::parse_fs_path(cwd, base, "..").unwrap(), rp(""));
    }
}
