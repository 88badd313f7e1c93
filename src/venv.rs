//! Saved virtual environments behind `kpy`.
//!
//! Each environment is archived as `<dir>/<name>.tar.gz`, and listed in `<dir>/index.json`.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::shell::{join, Shell, ShellError};

const INDEX_FILE: &str = "index.json";

/// A failure to save, load, or find an environment.
#[derive(Debug, Error)]
pub enum VenvError {
    /// No environment is active.
    #[error("No virtual environment is active (VIRTUAL_ENV is not set).")]
    NoActiveVenv,
    /// The name contains characters other than letters, digits, `.`, `_` & `-`.
    #[error("'{0}' is not a valid environment name.")]
    InvalidName(String),
    /// The name is taken.
    #[error("An environment called '{0}' is already saved (use --force to replace it).")]
    Exists(String),
    /// Nothing is saved under the name.
    #[error("No environment called '{0}' is saved.")]
    NotFound(String),
    /// `tar` failed.
    #[error("Archiving '{name}' failed (exit code {code}).")]
    Archive {
        /// The environment name.
        name: String,
        /// The exit code of `tar`.
        code: i32,
    },
    /// The index or an archive could not be read or written.
    #[error("cannot access '{path}': {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The index is not valid.
    #[error("index '{path}' is malformed: {source}")]
    Malformed {
        /// The index file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: serde_json::Error,
    },
    /// `tar` could not be run.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// One saved environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Saved {
    /// The archive.
    pub archive: PathBuf,
    /// The environment it was saved from.
    pub source: PathBuf,
}

/// The saved environments of one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    dir: PathBuf,
    entries: BTreeMap<String, Saved>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
}

/// The command line extracting `archive` into `dest`.
pub fn extract_command(archive: &Path, dest: &Path) -> String {
    let archive = archive.display().to_string();
    let dest = dest.display().to_string();
    format!(
        "{} && {}",
        join(&["mkdir", "-p", dest.as_str()]),
        join(&["tar", "-xzf", archive.as_str(), "-C", dest.as_str()])
    )
}

impl Index {
    /// Read the index under `dir`; a missing index reads as empty.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, VenvError> {
        let dir = dir.into();
        let path = dir.join(INDEX_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|source| VenvError::Malformed { path, source })?,
            Err(error) if error.kind() == ErrorKind::NotFound => BTreeMap::default(),
            Err(source) => return Err(VenvError::Io { path, source }),
        };

        Ok(Self { dir, entries })
    }

    fn write(&self) -> Result<(), VenvError> {
        let path = self.dir.join(INDEX_FILE);
        let text =
            serde_json::to_string_pretty(&self.entries).map_err(|source| VenvError::Malformed {
                path: path.clone(),
                source,
            })?;
        fs::write(&path, text).map_err(|source| VenvError::Io { path, source })
    }

    /// The saved environments, by name.
    pub fn entries(&self) -> &BTreeMap<String, Saved> {
        &self.entries
    }

    /// The environment saved as `name`.
    pub fn get(&self, name: &str) -> Result<&Saved, VenvError> {
        self.entries
            .get(name)
            .ok_or_else(|| VenvError::NotFound(name.to_string()))
    }

    /// Archive the environment at `venv` as `name`.
    pub fn save(
        &mut self,
        shell: &dyn Shell,
        name: &str,
        venv: &Path,
        force: bool,
    ) -> Result<&Saved, VenvError> {
        if !valid_name(name) {
            return Err(VenvError::InvalidName(name.to_string()));
        }

        if self.entries.contains_key(name) && !force {
            return Err(VenvError::Exists(name.to_string()));
        }

        fs::create_dir_all(&self.dir).map_err(|source| VenvError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let archive = self.dir.join(format!("{name}.tar.gz"));
        let code = shell.run(&join(&[
            "tar".to_string(),
            "-czf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            venv.display().to_string(),
            ".".to_string(),
        ]))?;

        if code != 0 {
            return Err(VenvError::Archive {
                name: name.to_string(),
                code,
            });
        }

        info!("Saved {} as '{name}'.", venv.display());
        self.entries.insert(
            name.to_string(),
            Saved {
                archive,
                source: venv.to_path_buf(),
            },
        );
        self.write()?;
        self.get(name)
    }

    /// Extract `name` into `<dest>/<name>`, returning its activation script.
    pub fn extract(&self, shell: &dyn Shell, name: &str, dest: &Path) -> Result<PathBuf, VenvError> {
        let saved = self.get(name)?;
        let target = dest.join(name);
        let code = shell.run(&extract_command(&saved.archive, &target))?;

        if code != 0 {
            return Err(VenvError::Archive {
                name: name.to_string(),
                code,
            });
        }

        debug!("Extracted '{name}' to {}.", target.display());
        Ok(target.join("bin").join("activate"))
    }

    /// Forget `name` and delete its archive.
    pub fn remove(&mut self, name: &str) -> Result<Saved, VenvError> {
        let saved = self
            .entries
            .remove(name)
            .ok_or_else(|| VenvError::NotFound(name.to_string()))?;

        match fs::remove_file(&saved.archive) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(VenvError::Io {
                    path: saved.archive,
                    source,
                })
            }
        }

        self.write()?;
        Ok(saved)
    }
}
