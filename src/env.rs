use kslurm_args::{ConsoleInterface, UserInterface};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

use crate::cache::Cache;
use crate::config::{Config, ConfigFileError, CONFIG_FILE};
use crate::shell::{Shell, SystemShell};

const APPLICATION: &str = "kslurm";

/// The platform offers no place to keep state.
#[derive(Debug, Error)]
#[error("cannot locate the {0} directory (set KSLURM_HOME).")]
pub struct EnvError(&'static str);

/// What a command needs from its surroundings, read once when the command starts.
///
/// Everything is passed explicitly: the variables, the state directories, the shell, and the console.
#[derive(Clone)]
pub struct Environment {
    user: Option<String>,
    virtual_env: Option<PathBuf>,
    config_dir: PathBuf,
    cache_dir: PathBuf,
    data_dir: PathBuf,
    shell: Rc<dyn Shell>,
    ui: Rc<dyn UserInterface>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment{..}")
            .field("user", &self.user)
            .field("virtual_env", &self.virtual_env)
            .field("config_dir", &self.config_dir)
            .field("cache_dir", &self.cache_dir)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl Environment {
    /// Snapshot the process environment, with the system shell and the console.
    ///
    /// `KSLURM_HOME`, when set, holds all of the state (`config/`, `cache/`, `data/`).
    /// Otherwise the platform's config, cache & data directories are used.
    pub fn from_process() -> Result<Self, EnvError> {
        let environment = match var("KSLURM_HOME") {
            Some(home) => Environment::rooted(
                home,
                Rc::new(SystemShell::default()),
                Rc::new(ConsoleInterface::default()),
            ),
            None => {
                let locate = |dir: Option<PathBuf>, name: &'static str| {
                    dir.map(|dir| dir.join(APPLICATION)).ok_or(EnvError(name))
                };

                Environment {
                    user: None,
                    virtual_env: None,
                    config_dir: locate(dirs::config_dir(), "config")?,
                    cache_dir: locate(dirs::cache_dir(), "cache")?,
                    data_dir: locate(dirs::data_dir(), "data")?,
                    shell: Rc::new(SystemShell::default()),
                    ui: Rc::new(ConsoleInterface::default()),
                }
            }
        };

        Ok(environment
            .with_user(var("USER"))
            .with_virtual_env(var("VIRTUAL_ENV").map(PathBuf::from)))
    }

    /// An environment keeping all of its state under `root`.
    pub fn rooted(root: impl AsRef<Path>, shell: Rc<dyn Shell>, ui: Rc<dyn UserInterface>) -> Self {
        let root = root.as_ref();
        Self {
            user: None,
            virtual_env: None,
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
            shell,
            ui,
        }
    }

    /// Set the user name.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Set the active virtual environment.
    pub fn with_virtual_env(mut self, virtual_env: Option<PathBuf>) -> Self {
        self.virtual_env = virtual_env;
        self
    }

    /// The user name (`USER`).
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The active virtual environment (`VIRTUAL_ENV`).
    pub fn virtual_env(&self) -> Option<&Path> {
        self.virtual_env.as_deref()
    }

    /// The shell used to run commands.
    pub fn shell(&self) -> &dyn Shell {
        self.shell.as_ref()
    }

    /// Where output goes.
    pub fn ui(&self) -> &dyn UserInterface {
        self.ui.as_ref()
    }

    /// The config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Read the config file.
    pub fn config(&self) -> Result<Config, ConfigFileError> {
        Config::load(self.config_file())
    }

    /// The cache.
    pub fn cache(&self) -> Cache {
        Cache::new(&self.cache_dir)
    }

    /// The data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Where container images live: `container.dir`, else `<data>/containers`.
    pub fn container_dir(&self, config: &Config) -> PathBuf {
        config
            .get("container.dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir.join("containers"))
    }

    /// Where saved virtual environments live: `venv.dir`, else `<data>/venvs`.
    pub fn venv_dir(&self, config: &Config) -> PathBuf {
        config
            .get("venv.dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir.join("venvs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::RecordingShell;
    use kslurm_args::InMemoryInterface;
    use tempfile::TempDir;

    fn environment(root: &Path) -> Environment {
        Environment::rooted(
            root,
            Rc::new(RecordingShell::default()),
            Rc::new(InMemoryInterface::default()),
        )
    }

    #[test]
    fn rooted_layout() {
        // Setup
        let dir = TempDir::new().unwrap();

        // Execute
        let environment = environment(dir.path()).with_user(Some("tester".to_string()));

        // Verify
        assert_eq!(environment.user(), Some("tester"));
        assert_eq!(environment.virtual_env(), None);
        assert_eq!(environment.config_file(), dir.path().join("config").join("config.json"));
        assert_eq!(environment.cache().dir(), dir.path().join("cache"));
    }

    #[test]
    fn state_directories() {
        // Setup
        let dir = TempDir::new().unwrap();
        let environment = environment(dir.path());
        let mut config = environment.config().unwrap();

        // Execute
        let before = (environment.container_dir(&config), environment.venv_dir(&config));
        config.set("container.dir", "/project/images").unwrap();
        config.set("venv.dir", "/project/venvs").unwrap();
        let after = (environment.container_dir(&config), environment.venv_dir(&config));

        // Verify
        assert_eq!(
            before,
            (dir.path().join("data").join("containers"), dir.path().join("data").join("venvs"))
        );
        assert_eq!(after, (PathBuf::from("/project/images"), PathBuf::from("/project/venvs")));
    }
}
