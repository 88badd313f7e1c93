//! The commands, one module per entry point.
//!
//! Each module exposes `command`, building its [`Command`] against an [`Environment`].
//! [`run`] wires a command to the process environment; [`run_in`] to any other.
pub mod kapp;
pub mod kbatch;
pub mod kjupyter;
pub mod kpy;
pub mod krun;
pub mod kslurm;

use kslurm_args::{Command, CommandError, ConfigError, ConsoleInterface, UserInterface};
use std::path::Path;
use std::rc::Rc;

use crate::cache::CacheError;
use crate::config::ConfigFileError;
use crate::container::StoreError;
use crate::env::Environment;
use crate::shell::ShellError;
use crate::slurm::SlurmError;
use crate::venv::VenvError;

/// Builds a command against an environment.
pub type Build = fn(Rc<Environment>) -> Result<Command, ConfigError>;

/// Run the command built by `build` against `argv` in the process environment, returning the exit code.
///
/// The entry is shown by its file name (`/opt/bin/kbatch` is `kbatch`).
pub fn run(build: Build, mut argv: Vec<String>) -> i32 {
    let name = argv
        .first()
        .and_then(|entry| Path::new(entry).file_name())
        .map(|name| name.to_string_lossy().into_owned());

    if let (Some(entry), Some(name)) = (argv.first_mut(), name) {
        *entry = name;
    }

    match Environment::from_process() {
        Ok(environment) => run_in(Rc::new(environment), build, argv),
        Err(error) => {
            ConsoleInterface::default().print_error(error.to_string());
            1
        }
    }
}

/// Run the command built by `build` against `argv` in `environment`, returning the exit code.
pub fn run_in(environment: Rc<Environment>, build: Build, argv: Vec<String>) -> i32 {
    match build(environment.clone()) {
        Ok(command) => command.cli_with(argv, environment.ui()),
        Err(error) => {
            environment.ui().print_error(error.to_string());
            1
        }
    }
}

macro_rules! command_errors {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for CommandError {
                fn from(error: $error) -> Self {
                    CommandError::new(error.to_string())
                }
            }
        )*
    };
}

command_errors!(
    CacheError,
    ConfigFileError,
    ShellError,
    SlurmError,
    StoreError,
    VenvError,
);
