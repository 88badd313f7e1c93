use kslurm_args::{Command, CommandError, ConfigError, Model, Parameter, Tail, ValueError, Values};
use std::rc::Rc;
use tracing::info;

use crate::env::Environment;
use crate::slurm::{salloc, srun, SlurmRequest};

/// The `krun` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Krun {
    /// The resources.
    pub slurm: SlurmRequest,
}

impl Model for Krun {
    fn doc() -> &'static str {
        "Run a command in a new SLURM allocation, or open an interactive session.

        Resources may be given in any order before the command.
        Without a command, an interactive allocation is requested with salloc."
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        SlurmRequest::parameters()
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Krun {
            slurm: SlurmRequest::from_values(values)?,
        })
    }
}

/// The `krun` command.
pub fn command(environment: Rc<Environment>) -> Result<Command, ConfigError> {
    Ok(Command::new::<Krun, _>("krun", move |krun, invocation| {
        allocate(&environment, krun, invocation.tail())
    })?
    .tail(Tail::new().help("The command to run; an interactive session when omitted."))
    .terminate_on_unknown())
}

fn allocate(
    environment: &Environment,
    krun: Krun,
    command: &[String],
) -> Result<i32, CommandError> {
    let resources = krun.slurm.resolve(environment)?;
    let line = if command.is_empty() {
        salloc(&resources)
    } else {
        srun(&resources, command)
    };

    if krun.slurm.test {
        environment.ui().print(line);
        return Ok(0);
    }

    info!("Allocating: {line}");
    Ok(environment.shell().run(&line)?)
}
