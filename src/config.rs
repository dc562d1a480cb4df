//! Configuration for the `persistor` command-line tool.
//!
//! Settings are read from a TOML file:
//!
//! ```toml
//! backend = "redb"              # "file" (default) or "redb"
//! path = "/var/lib/app/store"   # defaults to the user data directory
//! storage_key = "app:registry"  # defaults to "persistor:registry"
//! log_level = "info"            # overridden by RUST_LOG
//! ```
//!
//! Every field is optional; an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::DEFAULT_STORAGE_KEY;

/// File looked up in the current directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "persistor.toml";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Which bundled backing store the CLI opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file.
    #[default]
    File,
    /// A redb database.
    Redb,
}

impl BackendKind {
    fn default_file_name(self) -> &'static str {
        match self {
            Self::File => "store.json",
            Self::Redb => "store.redb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendKind,
    /// Store location. `None` uses [`Settings::default_store_path`].
    pub path: Option<PathBuf>,
    pub storage_key: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            path: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from [`DEFAULT_CONFIG_FILE`] in the
    /// current directory if it exists, or falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file is missing, or if the
    /// file that is used cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load_from(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an invalid type or an unknown backend name
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Where the store lives when no `path` is configured:
    /// `<data dir>/persistor/store.json` (or `store.redb`).
    pub fn default_store_path(backend: BackendKind) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("persistor")
            .join(backend.default_file_name())
    }

    pub fn store_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Self::default_store_path(self.backend))
    }

    /// Checks the settings for mistakes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage key is empty or the store path is a
    /// directory.
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.storage_key.is_empty() {
            errors.push("storage_key cannot be empty".to_string());
        }

        if let Some(path) = &self.path {
            if path.is_dir() {
                errors.push(format!(
                    "Store path is a directory: {}\n  \
                     Expected a file path such as {}",
                    path.display(),
                    path.join(self.backend.default_file_name()).display()
                ));
            }

            let extension = path.extension().and_then(|e| e.to_str());
            if self.backend == BackendKind::Redb && extension == Some("json") {
                warnings.push(format!(
                    "Store path {} looks like a JSON file but backend is \"redb\"",
                    path.display()
                ));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.storage_key, "persistor:registry");
        assert_eq!(settings.backend, BackendKind::File);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
backend = "redb"
path = "/tmp/app.redb"
storage_key = "app:registry"
log_level = "debug"
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.backend, BackendKind::Redb);
        assert_eq!(settings.store_path(), PathBuf::from("/tmp/app.redb"));
        assert_eq!(settings.storage_key, "app:registry");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(toml::from_str::<Settings>(r#"backend = "sqlite""#).is_err());
    }

    #[test]
    fn test_default_store_path_follows_backend() {
        let settings = Settings {
            backend: BackendKind::Redb,
            ..Settings::default()
        };
        let path = settings.store_path();
        assert!(path.ends_with("persistor/store.redb"));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("persistor.toml");
        fs::write(&path, "storage_key = \"custom\"\n").unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.storage_key, "custom");
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let err = Settings::load(Some(missing.as_path())).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validate() {
        let tmp = TempDir::new().unwrap();

        let empty_key = Settings {
            storage_key: String::new(),
            ..Settings::default()
        };
        assert!(empty_key.validate().is_err());

        let dir_path = Settings {
            path: Some(tmp.path().to_path_buf()),
            ..Settings::default()
        };
        assert!(dir_path.validate().is_err());

        let mismatched = Settings {
            backend: BackendKind::Redb,
            path: Some(tmp.path().join("store.json")),
            ..Settings::default()
        };
        assert!(mismatched.validate().unwrap().has_warnings());
        assert!(!Settings::default().validate().unwrap().has_warnings());
    }
}
