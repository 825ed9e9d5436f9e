//! `ignore` / `include` (spec.md §4.6): append a gitignore-style pattern to
//! `Settings` and persist the new object. Both are physical inverses — the
//! command layer captures the old/new `Settings` hashes as a
//! `domain_deltas["settings_hash"]` entry for the action log.

use crate::backend::Settings;
use crate::backend::StoredObject as _;
use crate::cas::Cas;
use crate::cas::CasError;
use crate::object_id::SettingsId;

pub fn add_ignore_pattern(cas: &Cas, settings: &SettingsId, pattern: String) -> Result<SettingsId, CasError> {
    let mut updated: Settings = cas.get(settings)?;
    if !updated.ignore_patterns.contains(&pattern) {
        updated.ignore_patterns.push(pattern);
    }
    cas.put(&updated)
}

pub fn add_include_pattern(cas: &Cas, settings: &SettingsId, pattern: String) -> Result<SettingsId, CasError> {
    let mut updated: Settings = cas.get(settings)?;
    if !updated.include_patterns.contains(&pattern) {
        updated.include_patterns.push(pattern);
    }
    cas.put(&updated)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::uuid_util::Uuid;

    fn sample_settings(cas: &Cas) -> SettingsId {
        cas.put(&Settings {
            include_patterns: vec![],
            ignore_patterns: vec![],
            author_uuid: Uuid::new_random(),
            authors_table_hash: None,
            features: vec![],
        })
        .unwrap()
    }

    #[test]
    fn add_ignore_pattern_appends_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let settings = sample_settings(&cas);
        let first = add_ignore_pattern(&cas, &settings, "*.pyc".into()).unwrap();
        let second = add_ignore_pattern(&cas, &first, "*.pyc".into()).unwrap();
        let final_settings: Settings = cas.get(&second).unwrap();
        assert_eq!(final_settings.ignore_patterns, vec!["*.pyc".to_string()]);
    }

    #[test]
    fn add_include_pattern_is_independent_of_ignore() {
        let dir = TempDir::new().unwrap();
        let cas = Cas::init(dir.path()).unwrap();
        let settings = sample_settings(&cas);
        let updated = add_include_pattern(&cas, &settings, "*.py".into()).unwrap();
        let final_settings: Settings = cas.get(&updated).unwrap();
        assert_eq!(final_settings.include_patterns, vec!["*.py".to_string()]);
        assert!(final_settings.ignore_patterns.is_empty());
    }
}
