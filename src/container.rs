//! The container image store behind `kapp`.
//!
//! Images live as `<root>/images/<name>.sif`; each alias is a file `<root>/aliases/<alias>` holding an image file
//! name.
//! An image is deleted once its last alias is removed.
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::shell::{join, Shell, ShellError};

/// The container runtime when none is configured.
pub const DEFAULT_RUNTIME: &str = "singularity";

const URI_PATTERN: &str = r"^(docker|library)://([A-Za-z0-9._/-]+?)(?::([A-Za-z0-9._-]+))?$";
const ALIAS_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

fn compiled(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| match Regex::new(source) {
        Ok(regex) => regex,
        Err(error) => unreachable!("internal error - invalid pattern '{source}': {error}"),
    })
}

fn is_alias(name: &str) -> bool {
    static ALIAS: OnceLock<Regex> = OnceLock::new();
    compiled(&ALIAS, ALIAS_PATTERN).is_match(name)
}

/// A failure of the image store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The uri is not a `docker://` or `library://` reference.
    #[error("'{0}' is not a docker:// or library:// uri.")]
    InvalidUri(String),
    /// The alias contains characters other than letters, digits, `.`, `_` & `-`.
    #[error("'{0}' is not a valid alias.")]
    InvalidAlias(String),
    /// The alias is taken.
    #[error("The alias '{alias}' already points to {image} (use --force to replace it).")]
    AliasExists {
        /// The alias.
        alias: String,
        /// The image it points to.
        image: String,
    },
    /// Nothing is known by that name.
    #[error("No image or alias called '{0}'.")]
    NotFound(String),
    /// The runtime failed to pull the image.
    #[error("Pulling '{uri}' failed (exit code {code}).")]
    Pull {
        /// The uri.
        uri: String,
        /// The runtime's exit code.
        code: i32,
    },
    /// The store could not be read or written.
    #[error("cannot access '{path}': {source}")]
    Io {
        /// The file or directory.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The runtime could not be run.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

fn io(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUri {
    scheme: String,
    path: String,
    tag: String,
}

impl ImageUri {
    /// Parse `docker://<path>[:<tag>]` or `library://<path>[:<tag>]`; the tag defaults to `latest`.
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        static URI: OnceLock<Regex> = OnceLock::new();
        let captures = compiled(&URI, URI_PATTERN)
            .captures(uri)
            .ok_or_else(|| StoreError::InvalidUri(uri.to_string()))?;

        Ok(ImageUri {
            scheme: captures[1].to_string(),
            path: captures[2].trim_matches('/').to_string(),
            tag: captures
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "latest".to_string()),
        })
    }

    /// The image file name (ex: `akhanf_hippunfold_latest.sif`).
    pub fn file_name(&self) -> String {
        format!("{}_{}.sif", self.path.replace('/', "_"), self.tag)
    }
}

impl std::fmt::Display for ImageUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.path, self.tag)
    }
}

/// The image store under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    root: PathBuf,
    runtime: String,
}

impl Store {
    /// A store under `root`, driven by `runtime` (ex: `singularity`).
    pub fn new(root: impl Into<PathBuf>, runtime: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            runtime: runtime.into(),
        }
    }

    fn images(&self) -> PathBuf {
        self.root.join("images")
    }

    fn aliases(&self) -> PathBuf {
        self.root.join("aliases")
    }

    /// Pull `uri` (unless present, or `force`d), and point `alias` at it.
    /// Returns the image path.
    pub fn pull(
        &self,
        shell: &dyn Shell,
        uri: &str,
        alias: Option<&str>,
        force: bool,
    ) -> Result<PathBuf, StoreError> {
        let uri = ImageUri::parse(uri)?;

        if let Some(alias) = alias {
            self.check_alias(alias, force)?;
        }

        let images = self.images();
        fs::create_dir_all(&images).map_err(io(&images))?;
        let image = images.join(uri.file_name());

        if image.exists() && !force {
            info!("{} is already pulled to {}.", uri, image.display());
        } else {
            let mut command = vec![self.runtime.clone(), "pull".to_string()];

            if force {
                command.push("--force".to_string());
            }

            command.push(image.display().to_string());
            command.push(uri.to_string());
            let code = shell.run(&join(&command))?;

            if code != 0 {
                return Err(StoreError::Pull {
                    uri: uri.to_string(),
                    code,
                });
            }
        }

        if let Some(alias) = alias {
            let aliases = self.aliases();
            fs::create_dir_all(&aliases).map_err(io(&aliases))?;
            let path = aliases.join(alias);
            fs::write(&path, uri.file_name()).map_err(io(&path))?;
            debug!("Aliased '{alias}' to {}.", uri.file_name());
        }

        Ok(image)
    }

    fn check_alias(&self, alias: &str, force: bool) -> Result<(), StoreError> {
        if !is_alias(alias) {
            return Err(StoreError::InvalidAlias(alias.to_string()));
        }

        match self.alias(alias)? {
            Some(image) if !force => Err(StoreError::AliasExists {
                alias: alias.to_string(),
                image,
            }),
            _ => Ok(()),
        }
    }

    fn alias(&self, alias: &str) -> Result<Option<String>, StoreError> {
        if !is_alias(alias) {
            return Ok(None);
        }

        let path = self.aliases().join(alias);

        match fs::read_to_string(&path) {
            Ok(image) => Ok(Some(image.trim().to_string())),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn entries(dir: &Path) -> Result<Vec<String>, StoreError> {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };
        let mut names = Vec::default();

        for entry in listing {
            let entry = entry.map_err(io(dir))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        names.sort();
        Ok(names)
    }

    /// Every alias with the image it points to, by alias.
    pub fn list_aliases(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut aliases = BTreeMap::default();

        for name in Store::entries(&self.aliases())? {
            if let Some(image) = self.alias(&name)? {
                aliases.insert(name, image);
            }
        }

        Ok(aliases)
    }

    /// Every image file name.
    pub fn list_images(&self) -> Result<Vec<String>, StoreError> {
        Store::entries(&self.images())
    }

    /// Find the image called `name`: an alias, a uri, or a path to an image file.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if let Some(image) = self.alias(name)? {
            return Ok(self.images().join(image));
        }

        if let Ok(uri) = ImageUri::parse(name) {
            let image = self.images().join(uri.file_name());

            if image.exists() {
                return Ok(image);
            }
        }

        let path = PathBuf::from(name);

        if path.is_file() {
            return Ok(path);
        }

        Err(StoreError::NotFound(name.to_string()))
    }

    /// The command line running `name` with `args`.
    pub fn run_command(&self, name: &str, args: &[String]) -> Result<String, StoreError> {
        let mut command = vec![
            self.runtime.clone(),
            "run".to_string(),
            self.resolve(name)?.display().to_string(),
        ];
        command.extend(args.iter().cloned());
        Ok(join(&command))
    }

    /// The command line opening a shell in `name`.
    pub fn shell_command(&self, name: &str) -> Result<String, StoreError> {
        Ok(join(&[
            self.runtime.clone(),
            "shell".to_string(),
            self.resolve(name)?.display().to_string(),
        ]))
    }

    /// Remove `alias`, deleting its image once nothing else points to it.
    /// Returns the deleted image, if any.
    pub fn remove(&self, alias: &str) -> Result<Option<PathBuf>, StoreError> {
        let image = self
            .alias(alias)?
            .ok_or_else(|| StoreError::NotFound(alias.to_string()))?;
        let path = self.aliases().join(alias);
        fs::remove_file(&path).map_err(io(&path))?;

        if self.list_aliases()?.values().any(|other| other == &image) {
            return Ok(None);
        }

        let image = self.images().join(image);

        match fs::remove_file(&image) {
            Ok(()) => Ok(Some(image)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: image,
                source,
            }),
        }
    }
}
