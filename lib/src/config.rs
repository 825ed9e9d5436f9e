//! The ambient user config layer (SPEC_FULL.md §3): an optional
//! `~/.config/vex/config.toml` (or `$VEX_CONFIG`) supplying a default
//! author identity and default repository features. Consulted by `init`
//! to seed the first `Settings` object; independent of the in-repository
//! CAS state.

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("{path} is not valid TOML: {source}")]
    Parse { path: PathBuf, source: toml_edit::TomlError },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub default_features: Vec<String>,
}

/// Resolves the config file path: `$VEX_CONFIG` if set, else
/// `~/.config/vex/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VEX_CONFIG") {
        return Some(PathBuf::from(path));
    }
    std::env::var("HOME").ok().map(|home| Path::new(&home).join(".config/vex/config.toml"))
}

/// Loads the user config, returning the default (empty) config if no file
/// is present at the resolved path.
pub fn load() -> ConfigResult<UserConfig> {
    let Some(path) = config_path() else {
        return Ok(UserConfig::default());
    };
    load_from(&path)
}

fn load_from(path: &Path) -> ConfigResult<UserConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserConfig::default()),
        Err(source) => return Err(ConfigError::Io { path: path.to_path_buf(), source }),
    };
    let doc: toml_edit::DocumentMut = contents.parse().map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    let author_name = doc.get("user").and_then(|t| t.get("name")).and_then(|v| v.as_str()).map(str::to_owned);
    let author_email = doc.get("user").and_then(|t| t.get("email")).and_then(|v| v.as_str()).map(str::to_owned);
    let default_features = doc
        .get("repository")
        .and_then(|t| t.get("default_features"))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default();

    Ok(UserConfig {
        author_name,
        author_email,
        default_features,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_yields_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(load_from(&path).unwrap(), UserConfig::default());
    }

    #[test]
    fn reads_user_identity_and_features() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[user]\nname = \"Ada\"\nemail = \"ada@example.com\"\n\n[repository]\ndefault_features = [\"symlinks\"]\n",
        )
        .unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.author_name.as_deref(), Some("Ada"));
        assert_eq!(config.author_email.as_deref(), Some("ada@example.com"));
        assert_eq!(config.default_features, vec!["symlinks".to_owned()]);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid [[[ toml").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
    }
}
