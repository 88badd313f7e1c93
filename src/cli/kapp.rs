use kslurm_args::{Command, CommandError, ConfigError, Model, Parameter, Tail, ValueError, Values};
use std::rc::Rc;
use tracing::info;

use crate::container::{Store, DEFAULT_RUNTIME};
use crate::env::Environment;

/// The `kapp pull` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pull {
    /// The image uri.
    pub uri: String,
    /// The alias to register.
    pub alias: Option<String>,
    /// Pull again, and replace an existing alias.
    pub force: bool,
}

impl Model for Pull {
    fn doc() -> &'static str {
        "Pull a container image.

        Each image is stored once, and may be referenced by any number of aliases.

        @uri.help A docker:// or library:// uri (ex: docker://akhanf/hippunfold:latest).
        @uri.metavar URI
        @alias.help The alias to refer to the image by.
        @alias.metavar ALIAS
        @force.help Pull even when present, replacing the alias."
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(vec![
            ("uri", Parameter::positional()),
            ("alias", Parameter::keyword(["-a", "--alias"]).optional()),
            ("force", Parameter::flag(["--force"])),
        ])
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Pull {
            uri: values.take("uri")?,
            alias: values.take_optional("alias")?,
            force: values.take("force")?,
        })
    }
}

/// The `kapp list` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List;

impl Model for List {
    fn doc() -> &'static str {
        "List the aliases and pulled images."
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(Vec::default())
    }

    fn from_values(_values: &mut Values) -> Result<Self, ValueError> {
        Ok(List)
    }
}

macro_rules! image_model {
    ($model:ident, $name:literal, $short:literal) => {
        #[doc = concat!("The `kapp ", $name, "` arguments.")]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $model {
            /// An alias, uri, or image path.
            pub name: String,
        }

        impl Model for $model {
            fn doc() -> &'static str {
                concat!(
                    $short,
                    "\n@name.help An alias, uri, or path to an image file.",
                    "\n@name.metavar NAME"
                )
            }

            fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
                Ok(vec![("name", Parameter::positional())])
            }

            fn from_values(values: &mut Values) -> Result<Self, ValueError> {
                Ok($model {
                    name: values.take("name")?,
                })
            }
        }
    };
}

image_model!(Run, "run", "Run an image.");
image_model!(Shell, "shell", "Open a shell in an image.");
image_model!(Remove, "rm", "Remove an alias; the image is deleted once no alias refers to it.");

fn store(environment: &Environment) -> Result<Store, CommandError> {
    let config = environment.config()?;
    let runtime = config.get("container.runtime").unwrap_or(DEFAULT_RUNTIME);
    Ok(Store::new(environment.container_dir(&config), runtime))
}

/// The `kapp` command.
pub fn command(environment: Rc<Environment>) -> Result<Command, ConfigError> {
    let pulling = environment.clone();
    let pull = Command::new::<Pull, _>("pull", move |pull, _| {
        let store = store(&pulling)?;
        let image = store.pull(pulling.shell(), &pull.uri, pull.alias.as_deref(), pull.force)?;
        info!("Pulled {} to {}.", pull.uri, image.display());

        match &pull.alias {
            Some(alias) => pulling
                .ui()
                .print(format!("{alias} -> {}", image.display())),
            None => pulling.ui().print(image.display().to_string()),
        }

        Ok(0)
    })?;

    let listing = environment.clone();
    let list = Command::new::<List, _>("list", move |_, _| {
        let store = store(&listing)?;
        let aliases = store.list_aliases()?;
        let images = store.list_images()?;

        if aliases.is_empty() && images.is_empty() {
            listing.ui().print("No images have been pulled.".to_string());
            return Ok(0);
        }

        for (alias, image) in &aliases {
            listing.ui().print(format!("{alias} -> {image}"));
        }

        for image in images.iter().filter(|image| !aliases.values().any(|a| a == *image)) {
            listing.ui().print(image.clone());
        }

        Ok(0)
    })?;

    let running = environment.clone();
    let run = Command::new::<Run, _>("run", move |image, invocation| {
        let line = store(&running)?.run_command(&image.name, invocation.tail())?;
        info!("Running: {line}");
        Ok(running.shell().run(&line)?)
    })?
    .tail(Tail::new().metavar("ARGS").help("Arguments for the image."))
    .terminate_on_unknown();

    let opening = environment.clone();
    let shell = Command::new::<Shell, _>("shell", move |image, _| {
        let line = store(&opening)?.shell_command(&image.name)?;
        info!("Opening: {line}");
        Ok(opening.shell().run(&line)?)
    })?;

    let removing = environment;
    let rm = Command::new::<Remove, _>("rm", move |image, _| {
        match store(&removing)?.remove(&image.name)? {
            Some(path) => removing
                .ui()
                .print(format!("Removed '{}' and {}.", image.name, path.display())),
            None => removing.ui().print(format!("Removed '{}'.", image.name)),
        }

        Ok(0)
    })?;

    Ok(Command::group("kapp", "Pull and run container images.")?
        .subcommand(pull)
        .subcommand(list)
        .subcommand(run)
        .subcommand(shell)
        .subcommand(rm))
}
