//! Workspace folders and their configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::CONFIG_FILE;
use crate::uri::DocumentUri;

/// Environment variable listing legacy path roots, separated like `PATH`.
pub const ENV_LEGACY_PATH: &str = "GROVE_PATH";

/// Environment variable naming an external build driver.
pub const ENV_DRIVER: &str = "GROVE_DRIVER";

/// Environment variable overriding workspace file discovery (`off` disables it).
pub const ENV_WORKSPACE_FILE: &str = "GROVE_WORK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Per-folder build options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    /// Directory include/exclude globs, relative to the folder: `-pattern` or `+pattern`.
    pub directory_filters: Vec<String>,
    /// Roots of legacy path-based builds. Each root's `src` directory holds packages.
    pub legacy_path: Vec<PathBuf>,
    /// External build driver. When set, every view of the folder is driver-based.
    pub driver: Option<String>,
    /// Explicit workspace file, or `off` to disable workspace file discovery.
    pub workspace_file: Option<String>,
}

impl Options {
    /// Load options for a folder: its config file (if any), then environment overrides.
    pub fn load(dir: &Path) -> Result<Options, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        let mut options = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Options::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        options.apply_env(|key| std::env::var(key).ok());
        Ok(options)
    }

    /// Apply environment overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(paths) = lookup(ENV_LEGACY_PATH) {
            self.legacy_path = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(driver) = lookup(ENV_DRIVER) {
            self.driver = match driver.as_str() {
                "" | "off" => None,
                _ => Some(driver),
            };
        }
        if let Some(work) = lookup(ENV_WORKSPACE_FILE) {
            self.workspace_file = if work.is_empty() { None } else { Some(work) };
        }
    }

    pub fn workspace_file_disabled(&self) -> bool {
        self.workspace_file.as_deref() == Some("off")
    }
}

/// A workspace folder opened by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub dir: DocumentUri,
    pub name: String,
    pub options: Options,
}

impl Folder {
    pub fn new(dir: DocumentUri, options: Options) -> Self {
        let name = dir.base_name().unwrap_or("root").to_string();
        Folder { dir, name, options }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reads_config_file() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "directory-filters = [\"-vendor\"]\ndriver = \"bazel\"\n",
        )
        .unwrap();

        let mut options = Options::load(temp.path()).unwrap();
        options.apply_env(|_| None);
        assert_eq!(options.directory_filters, vec!["-vendor".to_string()]);
        assert_eq!(options.driver.as_deref(), Some("bazel"));
    }

    #[test]
    fn test_env_overrides() {
        let mut options = Options {
            driver: Some("bazel".into()),
            ..Options::default()
        };
        options.apply_env(|key| match key {
            ENV_DRIVER => Some("off".into()),
            ENV_WORKSPACE_FILE => Some("off".into()),
            _ => None,
        });
        assert_eq!(options.driver, None);
        assert!(options.workspace_file_disabled());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "driver = [").unwrap();
        assert!(matches!(Options::load(temp.path()), Err(ConfigError::Parse { .. })));
    }
}
