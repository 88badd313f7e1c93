use kslurm_args::{Command, CommandError, ConfigError, Model, Parameter, ValueError, Values};
use std::rc::Rc;
use tracing::info;

use crate::config::{is_key, ConfigFileError, KEYS};
use crate::env::Environment;
use crate::slurm::{format_time, TEMPLATES};

/// The `kslurm config` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// The key to read or write; every setting when absent.
    pub key: Option<String>,
    /// The value to write.
    pub value: Option<String>,
}

impl Model for Settings {
    fn doc() -> &'static str {
        "Read or write a setting.

        Without a value, prints the key's setting; without a key, prints every setting.
        Keys: account, account.cpu, account.gpu, container.dir, container.runtime, venv.dir.

        @key.help The setting name.
        @key.metavar KEY
        @value.help The new value.
        @value.metavar VALUE"
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(vec![
            (
                "key",
                Parameter::positional()
                    .validate(|key| {
                        if is_key(key) {
                            Ok(())
                        } else {
                            Err(ConfigFileError::UnknownKey {
                                key: key.to_string(),
                            }
                            .to_string())
                        }
                    })
                    .optional(),
            ),
            ("value", Parameter::positional().optional()),
        ])
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Settings {
            key: values.take_optional("key")?,
            value: values.take_optional("value")?,
        })
    }
}

/// The `kslurm templates` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates;

impl Model for Templates {
    fn doc() -> &'static str {
        "List the job templates (see -j/--job-template)."
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(Vec::default())
    }

    fn from_values(_values: &mut Values) -> Result<Self, ValueError> {
        Ok(Templates)
    }
}

fn configure(environment: &Environment, settings: Settings) -> Result<i32, CommandError> {
    let mut config = environment.config()?;

    match (settings.key, settings.value) {
        (Some(key), Some(value)) => {
            config.set(&key, value.as_str())?;
            info!("Set {key} to '{value}' in {}.", config.path().display());
        }
        (Some(key), None) => {
            let value = config
                .get(&key)
                .ok_or_else(|| CommandError::new(format!("'{key}' is not set.")))?;
            environment.ui().print(value.to_string());
        }
        (None, _) => {
            for (key, _) in KEYS {
                if let Some(value) = config.get(key) {
                    environment.ui().print(format!("{key} = {value}"));
                }
            }
        }
    }

    Ok(0)
}

fn list_templates(environment: &Environment) -> i32 {
    let width = TEMPLATES
        .iter()
        .map(|template| template.name.len())
        .max()
        .unwrap_or_default();
    environment
        .ui()
        .print(format!("{:width$}  {:>4}  {:>8}  TIME", "NAME", "CPUS", "MEM (MB)"));

    for template in &TEMPLATES {
        environment.ui().print(format!(
            "{:width$}  {:>4}  {:>8}  {}",
            template.name,
            template.cpu,
            template.mem,
            format_time(template.time)
        ));
    }

    0
}

/// The `kslurm` command.
pub fn command(environment: Rc<Environment>) -> Result<Command, ConfigError> {
    let configuring = environment.clone();
    let config = Command::new::<Settings, _>("config", move |model, _| {
        configure(&configuring, model)
    })?;
    let listing = environment;
    let templates = Command::new::<Templates, _>("templates", move |_, _| Ok(list_templates(&listing)))?;

    Ok(Command::group("kslurm", "Configure the kslurm tools.")?
        .subcommand(config)
        .subcommand(templates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::RecordingShell;
    use kslurm_args::InMemoryInterface;
    use std::fs;
    use tempfile::TempDir;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn setup(dir: &TempDir) -> (Rc<Environment>, Command) {
        let environment = Rc::new(Environment::rooted(
            dir.path(),
            Rc::new(RecordingShell::default()),
            Rc::new(InMemoryInterface::default()),
        ));
        (environment.clone(), command(environment).unwrap())
    }

    #[test]
    fn set_then_get() {
        // Setup
        let dir = TempDir::new().unwrap();
        let (environment, kslurm) = setup(&dir);
        let setting = InMemoryInterface::default();
        let getting = InMemoryInterface::default();

        // Execute
        let set = kslurm.cli_with(argv(&["kslurm", "config", "account.cpu", "def-lpalaniy"]), &setting);
        let get = kslurm.cli_with(argv(&["kslurm", "config", "account.cpu"]), &getting);

        // Verify
        assert_eq!((set, get), (0, 0), "{}", setting.stderr());
        assert_eq!(
            fs::read_to_string(environment.config_file()).unwrap(),
            r#"{"account.cpu":"def-lpalaniy"}"#
        );
        assert_eq!(setting.stdout(), "");
        assert_eq!(getting.stdout(), "def-lpalaniy");
    }

    #[test]
    fn unknown_key() {
        // Setup
        let dir = TempDir::new().unwrap();
        let (environment, kslurm) = setup(&dir);
        let interface = InMemoryInterface::default();

        // Execute
        let code = kslurm.cli_with(argv(&["kslurm", "config", "acount", "x"]), &interface);

        // Verify
        assert_eq!(code, 1);
        assert!(!environment.config_file().exists());
        let stderr = interface.stderr();
        crate::test::assert_contains!(stderr, "USAGE: kslurm config");
        crate::test::assert_contains!(stderr, "Invalid value for 'key': 'acount' is not a config key");
    }

    #[test]
    fn unset_key() {
        let dir = TempDir::new().unwrap();
        let (_, kslurm) = setup(&dir);
        let interface = InMemoryInterface::default();
        assert_eq!(kslurm.cli_with(argv(&["kslurm", "config", "venv.dir"]), &interface), 1);
        assert_eq!(interface.stderr(), "'venv.dir' is not set.");
    }

    #[test]
    fn list_settings() {
        // Setup
        let dir = TempDir::new().unwrap();
        let (environment, kslurm) = setup(&dir);
        let mut config = environment.config().unwrap();
        config.set("venv.dir", "/project/venvs").unwrap();
        config.set("account", "def-lab").unwrap();
        let interface = InMemoryInterface::default();

        // Execute
        let code = kslurm.cli_with(argv(&["kslurm", "config"]), &interface);

        // Verify
        assert_eq!(code, 0);
        assert_eq!(interface.stdout(), "account = def-lab\nvenv.dir = /project/venvs");
    }

    #[test]
    fn template_table() {
        // Setup
        let dir = TempDir::new().unwrap();
        let (_, kslurm) = setup(&dir);
        let interface = InMemoryInterface::default();

        // Execute
        let code = kslurm.cli_with(argv(&["kslurm", "templates"]), &interface);

        // Verify
        assert_eq!(code, 0);
        let stdout = interface.stdout();
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "NAME        CPUS  MEM (MB)  TIME");
        assert_eq!(lines[2], "Regular       32    128000  1-00:00:00");
        assert_eq!(lines[6], "Short          4     16000  01:00:00");
    }
}
