use kslurm_args::{Command, CommandError, ConfigError, Kind, Model, Parameter, ValueError, Values};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

use crate::env::Environment;
use crate::shell::quote;
use crate::venv::{Index, VenvError};

/// The `kpy save` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Save {
    /// The name to save under.
    pub name: String,
    /// Replace a saved environment of the same name.
    pub force: bool,
}

impl Model for Save {
    fn doc() -> &'static str {
        "Archive the active virtual environment.

        @name.help The name to save the environment under.
        @name.metavar NAME
        @force.help Replace an environment saved under the same name."
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(vec![
            ("name", Parameter::positional()),
            ("force", Parameter::flag(["-f", "--force"])),
        ])
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Save {
            name: values.take("name")?,
            force: values.take("force")?,
        })
    }
}

/// The `kpy load` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Load {
    /// The saved environment.
    pub name: String,
    /// Where to extract it.
    pub dest: Option<PathBuf>,
}

impl Model for Load {
    fn doc() -> &'static str {
        "Extract a saved environment, and print the line which activates it.

        Use as: eval \"$(kpy load NAME)\"
        Extracts into $SLURM_TMPDIR when set, and the current directory otherwise.

        @name.help The saved environment.
        @name.metavar NAME
        @dest.help The directory to extract into.
        @dest.metavar DIR"
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(vec![
            ("name", Parameter::positional()),
            ("dest", Parameter::keyword(["-d", "--dest"]).kind(Kind::Path).optional()),
        ])
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Load {
            name: values.take("name")?,
            dest: values.take_optional("dest")?,
        })
    }
}

/// The `kpy rm` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remove {
    /// The saved environment.
    pub name: String,
}

impl Model for Remove {
    fn doc() -> &'static str {
        "Delete a saved environment.

        @name.metavar NAME"
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(vec![("name", Parameter::positional())])
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Remove {
            name: values.take("name")?,
        })
    }
}

fn index(environment: &Environment) -> Result<Index, CommandError> {
    let config = environment.config()?;
    Ok(Index::load(environment.venv_dir(&config))?)
}

// Extraction lands in the job's scratch space when there is one.
fn default_dest() -> PathBuf {
    std::env::var_os("SLURM_TMPDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// The `kpy` command.
pub fn command(environment: Rc<Environment>) -> Result<Command, ConfigError> {
    let saving = environment.clone();
    let save = Command::new::<Save, _>("save", move |save, _| {
        let venv = saving.virtual_env().ok_or(VenvError::NoActiveVenv)?;
        let mut index = index(&saving)?;
        let saved = index.save(saving.shell(), &save.name, venv, save.force)?;
        info!("Archived {} to {}.", venv.display(), saved.archive.display());
        saving
            .ui()
            .print(format!("Saved '{}' to {}.", save.name, saved.archive.display()));
        Ok(0)
    })?;

    let loading = environment.clone();
    let load = Command::new::<Load, _>("load", move |load, _| {
        let dest = load.dest.unwrap_or_else(default_dest);
        let activate = index(&loading)?.extract(loading.shell(), &load.name, &dest)?;
        loading
            .ui()
            .print(format!("source {}", quote(&activate.display().to_string())));
        Ok(0)
    })?;

    let listing = environment.clone();
    let list = Command::new::<List, _>("list", move |_, _| {
        let index = index(&listing)?;

        if index.entries().is_empty() {
            listing.ui().print("No environments are saved.".to_string());
        }

        for (name, saved) in index.entries() {
            listing
                .ui()
                .print(format!("{name} (from {})", saved.source.display()));
        }

        Ok(0)
    })?;

    let removing = environment;
    let rm = Command::new::<Remove, _>("rm", move |remove, _| {
        let saved = index(&removing)?.remove(&remove.name)?;
        removing
            .ui()
            .print(format!("Removed '{}' ({}).", remove.name, saved.archive.display()));
        Ok(0)
    })?;

    Ok(Command::group("kpy", "Save and restore python virtual environments.")?
        .subcommand(save)
        .subcommand(load)
        .subcommand(list)
        .subcommand(rm))
}

/// The `kpy list` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List;

impl Model for List {
    fn doc() -> &'static str {
        "List the saved environments."
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(Vec::default())
    }

    fn from_values(_values: &mut Values) -> Result<Self, ValueError> {
        Ok(List)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::RecordingShell;
    use kslurm_args::InMemoryInterface;
    use std::path::Path;
    use tempfile::TempDir;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn setup(
        dir: &TempDir,
        virtual_env: Option<&str>,
    ) -> (Command, RecordingShell, InMemoryInterface) {
        let shell = RecordingShell::default();
        let interface = InMemoryInterface::default();
        let environment = Environment::rooted(
            dir.path(),
            Rc::new(shell.clone()),
            Rc::new(interface.clone()),
        )
        .with_virtual_env(virtual_env.map(PathBuf::from));
        (command(Rc::new(environment)).unwrap(), shell, interface)
    }

    #[test]
    fn save_then_load() {
        // Setup
        let dir = TempDir::new().unwrap();
        let (kpy, shell, interface) = setup(&dir, Some("/home/u/.venv"));
        let archive = dir.path().join("data").join("venvs").join("ml.tar.gz");

        // Execute
        let saved = kpy.cli_with(argv(&["kpy", "save", "ml"]), &interface);
        let loaded = kpy.cli_with(argv(&["kpy", "load", "ml", "--dest", "/scratch"]), &interface);

        // Verify
        assert_eq!((saved, loaded), (0, 0), "{}", interface.stderr());
        assert_eq!(
            shell.commands(),
            vec![
                format!("tar -czf {} -C /home/u/.venv .", archive.display()),
                format!(
                    "mkdir -p /scratch/ml && tar -xzf {} -C /scratch/ml",
                    archive.display()
                ),
            ]
        );
        assert_eq!(
            interface.stdout(),
            format!(
                "Saved 'ml' to {}.\nsource /scratch/ml/bin/activate",
                archive.display()
            )
        );
    }

    #[test]
    fn save_requires_venv() {
        let dir = TempDir::new().unwrap();
        let (kpy, shell, interface) = setup(&dir, None);
        assert_eq!(kpy.cli_with(argv(&["kpy", "save", "ml"]), &interface), 1);
        assert!(shell.commands().is_empty());
        assert_eq!(
            interface.stderr(),
            "No virtual environment is active (VIRTUAL_ENV is not set)."
        );
    }

    #[test]
    fn list_and_remove() {
        // Setup
        let dir = TempDir::new().unwrap();
        let (kpy, _, _) = setup(&dir, Some("/home/u/.venv"));
        let quiet = InMemoryInterface::default();
        kpy.cli_with(argv(&["kpy", "save", "ml"]), &quiet);
        kpy.cli_with(argv(&["kpy", "save", "-f", "ml"]), &quiet);
        let listing = InMemoryInterface::default();
        let removing = InMemoryInterface::default();
        let relisting = InMemoryInterface::default();

        // Execute
        kpy.cli_with(argv(&["kpy", "list"]), &listing);
        let removed = kpy.cli_with(argv(&["kpy", "rm", "ml"]), &removing);
        kpy.cli_with(argv(&["kpy", "list"]), &relisting);

        // Verify
        assert_eq!(quiet.stderr(), "");
        assert_eq!(removed, 0);
        assert_eq!(listing.stdout(), "ml (from /home/u/.venv)");
        assert_eq!(relisting.stdout(), "No environments are saved.");
        assert!(!Path::new(&dir.path().join("data").join("venvs").join("ml.tar.gz")).exists());
    }

    #[test]
    fn duplicate_save() {
        let dir = TempDir::new().unwrap();
        let (kpy, _, interface) = setup(&dir, Some("/a"));
        assert_eq!(kpy.cli_with(argv(&["kpy", "save", "ml"]), &interface), 0);
        assert_eq!(kpy.cli_with(argv(&["kpy", "save", "ml"]), &interface), 1);
        crate::test::assert_contains!(interface.stderr(), "already saved");
    }
}
