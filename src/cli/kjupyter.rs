use kslurm_args::{Command, CommandError, ConfigError, Matcher, Model, Parameter, Tail, ValueError, Values};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::env::Environment;
use crate::shell::{join, quote, InterruptGuard};
use crate::slurm::{batch_script, parse_job_id, sbatch, SlurmRequest};
use crate::venv::Index;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// The exit code after an interrupt cancelled the job (`128 + SIGINT`).
pub const CANCELLED: i32 = 130;

/// The `kjupyter` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kjupyter {
    /// The resources.
    pub slurm: SlurmRequest,
    /// A saved environment to activate in the job.
    pub venv: Option<String>,
}

impl Model for Kjupyter {
    fn doc() -> &'static str {
        "Start a Jupyter Lab server in a SLURM batch job, and follow its log.

        The job is cancelled when interrupted (Ctrl-C).
        Unrecognised arguments are passed on to 'jupyter lab'.

        @venv.help An environment saved with 'kpy save', activated in the job.
        @venv.metavar VENV"
    }

    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        let mut parameters = SlurmRequest::parameters()?;
        // Option-like tokens are left for 'jupyter lab'.
        parameters.push((
            "venv",
            Parameter::positional().matching(Matcher::regex("^[^-]")?).optional(),
        ));
        Ok(parameters)
    }

    fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(Kjupyter {
            slurm: SlurmRequest::from_values(values)?,
            venv: values.take_optional("venv")?,
        })
    }
}

/// The `kjupyter` command.
pub fn command(environment: Rc<Environment>) -> Result<Command, ConfigError> {
    Ok(Command::new::<Kjupyter, _>("kjupyter", move |kjupyter, invocation| {
        launch(&environment, kjupyter, invocation.tail())
    })?
    .tail(
        Tail::new()
            .metavar("JUPYTER_ARGS")
            .help("Arguments for 'jupyter lab'."),
    )
    .allow_unknown())
}

fn launch(environment: &Environment, kjupyter: Kjupyter, args: &[String]) -> Result<i32, CommandError> {
    let config = environment.config()?;
    let mut resources = kjupyter.slurm.resolve(environment)?;
    let logs = environment.data_dir().join("jupyter");
    let mut lines = Vec::default();

    if let Some(name) = &kjupyter.venv {
        let index = Index::load(environment.venv_dir(&config))?;
        let saved = index.get(name)?;
        // Saved names are plain, and the job expands $SLURM_TMPDIR.
        let target = format!("\"$SLURM_TMPDIR\"/{name}");
        lines.push(format!(
            "mkdir -p {target} && tar -xzf {} -C {target}",
            quote(&saved.archive.display().to_string())
        ));
        lines.push(format!("source {target}/bin/activate"));
    }

    let mut jupyter = vec!["jupyter".to_string(), "lab".to_string(), "--no-browser".to_string()];
    jupyter.extend(args.iter().cloned());
    lines.push(format!("{} --ip=$(hostname -f)", join(&jupyter)));

    resources.parsable = true;
    resources.output = Some(logs.join("kjupyter-%j.log").display().to_string());
    let line = sbatch(&resources, &batch_script(&lines));

    if kjupyter.slurm.test {
        environment.ui().print(line);
        return Ok(0);
    }

    fs::create_dir_all(&logs)
        .map_err(|error| CommandError::new(format!("cannot create '{}': {error}", logs.display())))?;
    info!("Submitting: {line}");
    let submitted = environment.shell().capture(&line)?;

    if !submitted.success() {
        return Ok(submitted.code);
    }

    let job = parse_job_id(&submitted.stdout).ok_or_else(|| {
        CommandError::new(format!(
            "sbatch did not report a job id (output: '{}').",
            submitted.stdout.trim()
        ))
    })?;
    environment.ui().print(format!(
        "Submitted job {job}; waiting for Jupyter to start (Ctrl-C cancels the job)."
    ));
    follow(environment, job, &log_path(environment, job))
}

// Stream the log while the job is queued or running, cancelling it on interrupt.
fn follow(environment: &Environment, job: u64, log: &Path) -> Result<i32, CommandError> {
    let guard = InterruptGuard::install();
    let mut offset = 0;

    loop {
        if guard.interrupted() {
            return cancel(environment, job);
        }

        offset = stream(environment, log, offset);
        let state = environment
            .shell()
            .capture(&format!("squeue -h -j {job} -o %T"))?;

        // An interrupt during the query also kills `squeue`, which must not read as the job ending.
        if guard.interrupted() {
            return cancel(environment, job);
        }

        if !state.success() || state.stdout.trim().is_empty() {
            stream(environment, log, offset);
            info!("Job {job} has ended.");
            return Ok(0);
        }

        debug!("Job {job} is {}.", state.stdout.trim());
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn cancel(environment: &Environment, job: u64) -> Result<i32, CommandError> {
    warn!("Interrupted; cancelling job {job}.");
    environment.shell().run(&format!("scancel {job}"))?;
    Ok(CANCELLED)
}

// Print whatever the log gained since `offset`, returning the new offset.
fn stream(environment: &Environment, log: &Path, offset: usize) -> usize {
    let content = match fs::read(log) {
        Ok(content) => content,
        Err(_) => return offset,
    };

    if content.len() > offset {
        let fresh = String::from_utf8_lossy(&content[offset..]);
        environment.ui().print(fresh.trim_end_matches('\n').to_string());
    }

    content.len().max(offset)
}

/// The log file of `job`.
pub fn log_path(environment: &Environment, job: u64) -> PathBuf {
    environment
        .data_dir()
        .join("jupyter")
        .join(format!("kjupyter-{job}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{Captured, RecordingShell, Shell, ShellError};
    use kslurm_args::InMemoryInterface;
    use tempfile::TempDir;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn environment(dir: &TempDir, shell: &RecordingShell, interface: &InMemoryInterface) -> Rc<Environment> {
        let environment = Environment::rooted(
            dir.path(),
            Rc::new(shell.clone()),
            Rc::new(interface.clone()),
        );
        environment.config().unwrap().set("account", "def-lab").unwrap();
        Rc::new(environment)
    }

    #[test]
    fn submits_and_follows() {
        // Setup
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default().respond("echo", Captured::ok("4242\n"));
        let interface = InMemoryInterface::default();
        let environment = environment(&dir, &shell, &interface);
        let log = log_path(&environment, 4242);
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, "http://node1:8888/lab?token=abc\n").unwrap();

        // Execute
        let code = command(environment.clone())
            .unwrap()
            .cli_with(argv(&["kjupyter", "2:00", "--", "--port=9000"]), &interface);

        // Verify
        assert_eq!(code, 0, "{}", interface.stderr());
        let commands = shell.commands();
        assert_eq!(commands.len(), 2);
        crate::test::assert_contains!(commands[0], "jupyter lab --no-browser --port=9000 --ip=$(hostname -f)");
        crate::test::assert_contains!(
            commands[0],
            "| sbatch --account=def-lab --time=02:00:00 --cpus-per-task=1 --mem=4000 --parsable --output="
        );
        assert_eq!(commands[1], "squeue -h -j 4242 -o %T");
        crate::test::assert_contains!(interface.stdout(), "Submitted job 4242");
        crate::test::assert_contains!(interface.stdout(), "http://node1:8888/lab?token=abc");
    }

    #[test]
    fn unknown_venv() {
        // Setup
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default();
        let interface = InMemoryInterface::default();
        let environment = environment(&dir, &shell, &interface);

        // Execute
        let code = command(environment)
            .unwrap()
            .cli_with(argv(&["kjupyter", "ml"]), &interface);

        // Verify
        assert_eq!(code, 1);
        assert!(shell.commands().is_empty());
        assert_eq!(interface.stderr(), "No environment called 'ml' is saved.");
    }

    #[test]
    fn venv_activated() {
        // Setup
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default();
        let interface = InMemoryInterface::default();
        let environment = environment(&dir, &shell, &interface);
        let config = environment.config().unwrap();
        Index::load(environment.venv_dir(&config))
            .unwrap()
            .save(&shell, "ml", Path::new("/home/u/ml"), false)
            .unwrap();

        // Execute
        let code = command(environment)
            .unwrap()
            .cli_with(argv(&["kjupyter", "--test", "ml"]), &interface);

        // Verify
        assert_eq!(code, 0, "{}", interface.stderr());
        let stdout = interface.stdout();
        crate::test::assert_contains!(stdout, "mkdir -p \"$SLURM_TMPDIR\"/ml && tar -xzf");
        crate::test::assert_contains!(stdout, "source \"$SLURM_TMPDIR\"/ml/bin/activate");
    }

    #[test]
    fn options_left_for_jupyter() {
        // Setup
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default();
        let interface = InMemoryInterface::default();
        let environment = environment(&dir, &shell, &interface);

        // Execute
        let code = command(environment)
            .unwrap()
            .cli_with(argv(&["kjupyter", "--test", "--port=9000"]), &interface);

        // Verify
        assert_eq!(code, 0, "{}", interface.stderr());
        assert!(shell.commands().is_empty());
        crate::test::assert_contains!(
            interface.stdout(),
            "jupyter lab --no-browser --port=9000 --ip=$(hostname -f)"
        );
    }

    #[test]
    fn submission_failure_forwarded() {
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default().respond(
            "echo",
            Captured {
                code: 3,
                stdout: String::default(),
            },
        );
        let interface = InMemoryInterface::default();
        let environment = environment(&dir, &shell, &interface);
        let code = command(environment).unwrap().cli_with(argv(&["kjupyter"]), &interface);
        assert_eq!(code, 3);
    }

    // Delivers SIGINT while `squeue` runs, as Ctrl-C does to the whole process group.
    #[cfg(unix)]
    struct InterruptingShell(RecordingShell);

    #[cfg(unix)]
    impl Shell for InterruptingShell {
        fn run(&self, command: &str) -> Result<i32, ShellError> {
            self.0.run(command)
        }

        fn capture(&self, command: &str) -> Result<Captured, ShellError> {
            let captured = self.0.capture(command)?;

            if command.starts_with("squeue") {
                // SAFETY: `follow` holds an InterruptGuard, so the signal is recorded rather than fatal.
                unsafe {
                    libc::raise(libc::SIGINT);
                }
                return Ok(Captured {
                    code: 130,
                    stdout: String::default(),
                });
            }

            Ok(captured)
        }
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_while_polling_cancels() {
        // Setup
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default().respond("echo", Captured::ok("4242\n"));
        let interface = InMemoryInterface::default();
        let environment = Environment::rooted(
            dir.path(),
            Rc::new(InterruptingShell(shell.clone())),
            Rc::new(interface.clone()),
        );
        environment.config().unwrap().set("account", "def-lab").unwrap();

        // Execute
        let code = command(Rc::new(environment))
            .unwrap()
            .cli_with(argv(&["kjupyter"]), &interface);

        // Verify
        assert_eq!(code, CANCELLED, "{}", interface.stderr());
        let commands = shell.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1], "squeue -h -j 4242 -o %T");
        assert_eq!(commands[2], "scancel 4242");
    }
}
