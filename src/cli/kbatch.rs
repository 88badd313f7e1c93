use kslurm_args::{Command, CommandError, ConfigError, Model, Parameter, Tail, ValueError, Values};
use std::rc::Rc;
use tracing::info;

use crate::env::Environment;
use crate::shell::join;
use crate::slurm::{batch_script, sbatch, SlurmRequest};

/// The `kbatch` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kbatch {
    /// The resources.
    pub slurm: SlurmRequest,
    /// The log file pattern.
    pub output: Option<String>,
}

impl Model for Kbatch {
    fn doc() -> &'static str {
        "Submit a command to the SLURM batch queue.

        Resources may be given in any order before the command.
        The first argument which is not a resource starts the command; '--' also ends the resources.

        @output.help The log file pattern passed to sbatch (ex: logs/%x-%j.out).
        @output.metavar PATTERN"
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        let mut parameters = SlurmRequest::parameters()?;
        parameters.push(("output", Parameter::keyword(["-o", "--output"]).optional()));
        Ok(parameters)
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Kbatch {
            slurm: SlurmRequest::from_values(values)?,
            output: values.take_optional("output")?,
        })
    }
}

/// The `kbatch` command.
pub fn command(environment: Rc<Environment>) -> Result<Command, ConfigError> {
    Ok(Command::new::<Kbatch, _>("kbatch", move |kbatch, invocation| {
        submit(&environment, kbatch, invocation.tail())
    })?
    .tail(
        Tail::new()
            .help("The command to submit.")
            .required("Must provide a command"),
    )
    .terminate_on_unknown())
}

fn submit(
    environment: &Environment,
    kbatch: Kbatch,
    command: &[String],
) -> Result<i32, CommandError> {
    let mut resources = kbatch.slurm.resolve(environment)?;
    resources.output = kbatch.output;
    let line = sbatch(&resources, &batch_script(&[join(command)]));

    if kbatch.slurm.test {
        environment.ui().print(line);
        return Ok(0);
    }

    info!("Submitting: {line}");
    Ok(environment.shell().run(&line)?)
}
