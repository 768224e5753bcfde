//! User preferences: a flat string map persisted as JSON in the platform
//! config directory.

use crate::error::ConfigError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = "preferences.json";

pub mod keys {
    pub const LAYOUT: &str = "editor.layout";
    pub const RECENT_FILES: &str = "editor.recent-files";
    pub const SHOW_PREVIEW: &str = "editor.show-preview";
    pub const PREVIEW_THEME: &str = "editor.preview-theme";
    pub const CATALOG_PATHS: &str = "catalogs.paths";
}

pub const MAX_RECENT_FILES: usize = 8;

#[derive(Debug, Default)]
pub struct Preferences {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
    error_shown: bool,
}

impl Preferences {
    /// In-memory preferences that are never written.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = directories::ProjectDirs::from("org", "rad-designer", "rad-designer")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join(FILE_NAME))
    }

    /// Loads from the platform config directory. Problems are reported
    /// through the latch and leave the preferences empty.
    pub fn load() -> Self {
        match Self::default_path() {
            Ok(path) => match Self::open(&path) {
                Ok(prefs) => prefs,
                Err(err) => {
                    let mut prefs = Self {
                        path: Some(path),
                        ..Self::default()
                    };
                    prefs.report_error(&err);
                    prefs
                }
            },
            Err(err) => {
                let mut prefs = Self::default();
                prefs.report_error(&err);
                prefs
            }
        }
    }

    /// A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let values = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let values: BTreeMap<String, String> = serde_json::from_str(&content)?;
            log::info!("loaded preferences from {}", path.display());
            values
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
            error_shown: false,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.values)?)?;
        log::debug!("saved preferences to {}", path.display());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Logs a preferences error. Returns the message the first time only, so
    /// the user sees one report per session.
    pub fn report_error(&mut self, err: &ConfigError) -> Option<String> {
        if self.error_shown {
            log::debug!("preferences: {err}");
            return None;
        }
        log::error!("preferences: {err}");
        self.error_shown = true;
        Some(err.to_string())
    }

    pub fn error_shown(&self) -> bool {
        self.error_shown
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => crate::value::parse_bool(v).unwrap_or(default),
            None => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Structured values are stored as embedded JSON.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("preference `{key}` is malformed: {err}");
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), ConfigError> {
        self.values
            .insert(key.to_string(), serde_json::to_string(value)?);
        Ok(())
    }

    /// Extra catalog files loaded at startup, before those given on the
    /// command line.
    pub fn catalog_paths(&self) -> Vec<PathBuf> {
        self.get_json(keys::CATALOG_PATHS).unwrap_or_default()
    }

    pub fn recent_files(&self) -> Vec<PathBuf> {
        self.get_json(keys::RECENT_FILES).unwrap_or_default()
    }

    /// Moves `path` to the front of the recent list.
    pub fn push_recent_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let mut recent = self.recent_files();
        recent.retain(|p| p != path);
        recent.insert(0, path.to_path_buf());
        recent.truncate(MAX_RECENT_FILES);
        self.set_json(keys::RECENT_FILES, &recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::open(&dir.path().join("nope.json")).unwrap();
        assert_eq!(prefs.get("anything"), None);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);
        let mut prefs = Preferences::open(&path).unwrap();
        prefs.set(keys::SHOW_PREVIEW, "False");
        prefs.set("editor.width", 300);
        prefs.save().unwrap();

        let prefs = Preferences::open(&path).unwrap();
        assert!(!prefs.get_bool(keys::SHOW_PREVIEW, true));
        assert_eq!(prefs.get_int("editor.width", 0), 300);
        assert_eq!(prefs.get_float("editor.width", 0.0), 300.0);
    }

    #[test]
    fn test_typed_getters_fall_back() {
        let mut prefs = Preferences::new();
        prefs.set("flag", "maybe");
        prefs.set("count", "many");
        assert!(prefs.get_bool("flag", true));
        assert_eq!(prefs.get_int("count", 7), 7);
        assert_eq!(prefs.get_int("absent", 3), 3);
        prefs.set("flag", "yes");
        assert!(prefs.get_bool("flag", false));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Preferences::open(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_error_reported_once() {
        let mut prefs = Preferences::new();
        let err = ConfigError::NoConfigDir;
        assert!(prefs.report_error(&err).is_some());
        assert!(prefs.error_shown());
        assert!(prefs.report_error(&err).is_none());
    }

    #[test]
    fn test_recent_files() {
        let mut prefs = Preferences::new();
        for i in 0..10 {
            prefs.push_recent_file(Path::new(&format!("/tmp/{i}.json"))).unwrap();
        }
        prefs.push_recent_file(Path::new("/tmp/5.json")).unwrap();
        let recent = prefs.recent_files();
        assert_eq!(recent.len(), MAX_RECENT_FILES);
        assert_eq!(recent[0], Path::new("/tmp/5.json"));
        assert_eq!(recent[1], Path::new("/tmp/9.json"));
        assert_eq!(recent.iter().filter(|p| p.ends_with("5.json")).count(), 1);
    }
}
