// Store configuration, read from `config.yml` in the data directory

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "config.yml";
pub const DATA_DIR_ENV: &str = "PSK_DATA_DIR";

/// Warn when one serialized collection grows past this many bytes
pub const DEFAULT_SIZE_WARNING_BYTES: u64 = 4 * 1024 * 1024;

/// Persistence medium for the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file per collection
    #[default]
    Files,
    /// Key-value table in a SQLite database
    Sqlite,
    /// Nothing persisted past the process
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    pub backend: BackendKind,
    /// Hard cap on stored bytes; writes past it fail with a quota error
    pub quota_bytes: Option<u64>,
    pub size_warning_bytes: u64,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Files,
            quota_bytes: None,
            size_warning_bytes: DEFAULT_SIZE_WARNING_BYTES,
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load `config.yml` from `data_dir`, falling back to defaults when absent
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let path = data_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            serde_yaml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            debug!(path = ?path, "No config file, using defaults");
            Config::default()
        };

        config.data_dir = data_dir;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(self.data_dir.join(CONFIG_FILE), content).context("Failed to write config file")?;
        Ok(())
    }

    /// Directory the file backend keeps collection files in
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("pskstore.db")
    }
}

/// `$PSK_DATA_DIR`, else the platform data dir, else `./.pskstore`
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .map(|d| d.join("pskstore"))
        .unwrap_or_else(|| PathBuf::from(".pskstore"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();

        assert_eq!(config.backend, BackendKind::Files);
        assert_eq!(config.quota_bytes, None);
        assert_eq!(config.size_warning_bytes, DEFAULT_SIZE_WARNING_BYTES);
        assert_eq!(config.data_dir, temp.path());
    }

    #[test]
    fn test_load_partial_yaml() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "backend: sqlite\nquota_bytes: 5242880\n").unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.quota_bytes, Some(5_242_880));
        assert_eq!(config.size_warning_bytes, DEFAULT_SIZE_WARNING_BYTES);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            backend: BackendKind::Memory,
            quota_bytes: Some(10),
            size_warning_bytes: 5,
            data_dir: temp.path().to_path_buf(),
        };
        config.save().unwrap();

        assert_eq!(Config::load(temp.path()).unwrap(), config);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "backend: [nope").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }
}
