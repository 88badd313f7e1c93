use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// The recognised keys, with their descriptions.
pub const KEYS: [(&str, &str); 6] = [
    ("account", "The SLURM account used when no other applies."),
    ("account.cpu", "The SLURM account for cpu jobs."),
    ("account.gpu", "The SLURM account for gpu jobs."),
    ("container.dir", "Where container images & aliases are stored."),
    ("container.runtime", "The container runtime (ex: singularity, apptainer)."),
    ("venv.dir", "Where saved virtual environments are stored."),
];

/// The config file name, under the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// A failure to read or write the config file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read or written.
    #[error("cannot access config file '{path}': {source}")]
    Io {
        /// The config file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a flat JSON object of strings.
    #[error("config file '{path}' is malformed: {source}")]
    Malformed {
        /// The config file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: serde_json::Error,
    },
    /// The key is not recognised.
    #[error("'{key}' is not a config key (choose from: {}).", key_names())]
    UnknownKey {
        /// The rejected key.
        key: String,
    },
}

fn key_names() -> String {
    KEYS.iter()
        .map(|(key, _)| *key)
        .collect::<Vec<&str>>()
        .join(", ")
}

/// Whether `key` is a recognised config key.
pub fn is_key(key: &str) -> bool {
    KEYS.iter().any(|(k, _)| *k == key)
}

/// The persisted user configuration: a flat map of dotted keys to strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Config {
    /// Read the config at `path`; a missing file reads as empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigFileError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigFileError::Malformed {
                path: path.clone(),
                source,
            })?,
            Err(error) if error.kind() == ErrorKind::NotFound => BTreeMap::default(),
            Err(source) => return Err(ConfigFileError::Io { path, source }),
        };

        Ok(Self { path, values })
    }

    /// The config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set `key` and write the file.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigFileError> {
        if !is_key(key) {
            return Err(ConfigFileError::UnknownKey {
                key: key.to_string(),
            });
        }

        self.values.insert(key.to_string(), value.into());
        self.save()
    }

    fn save(&self) -> Result<(), ConfigFileError> {
        let io = |source| ConfigFileError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }

        let text = serde_json::to_string(&self.values).map_err(|source| ConfigFileError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        debug!("Writing {}.", self.path.display());
        fs::write(&self.path, text).map_err(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.get("account"), None);
    }

    #[test]
    fn set_then_load() {
        // Setup
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = Config::load(&path).unwrap();

        // Execute
        config.set("account.cpu", "def-lpalaniy").unwrap();
        config.set("account", "def-other").unwrap();

        // Verify
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"account":"def-other","account.cpu":"def-lpalaniy"}"#
        );
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.get("account.cpu"), Some("def-lpalaniy"));
        assert_eq!(reloaded, config);
    }

    #[test]
    fn unknown_key() {
        // Setup
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = Config::load(&path).unwrap();

        // Execute
        let result = config.set("acount", "x");

        // Verify
        assert_matches!(result, Err(ConfigFileError::UnknownKey { key }) => {
            assert_eq!(key, "acount");
        });
        assert!(!path.exists());
    }

    #[test]
    fn malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[1, 2]").unwrap();
        assert_matches!(Config::load(&path), Err(ConfigFileError::Malformed { .. }));
    }
}
