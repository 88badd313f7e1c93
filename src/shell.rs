use std::borrow::Cow;
use std::cell::RefCell;
use std::process::{Command, Stdio};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// A shell command which could not be run at all.
/// A command which runs and fails is not an error: its exit code is returned.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The shell could not be started.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        /// The command line.
        command: String,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The output of a captured command is not utf-8.
    #[error("output of '{0}' is not valid utf-8")]
    Encoding(String),
}

/// The result of a captured command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// The exit code.
    pub code: i32,
    /// The standard output, verbatim.
    pub stdout: String,
}

impl Captured {
    /// A successful result with `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
        }
    }

    /// Whether the command exited with `0`.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Behaviour to run shell command lines.
pub trait Shell {
    /// Run `command` attached to the terminal, returning its exit code.
    fn run(&self, command: &str) -> Result<i32, ShellError>;

    /// Run `command` collecting its standard output; standard error stays attached to the terminal.
    fn capture(&self, command: &str) -> Result<Captured, ShellError>;
}

/// Runs command lines through `bash -c`.
///
/// While a child runs, an interrupt is left to the child (it shares the terminal's process group), and the
/// parent only records that it happened.
#[derive(Debug, Default)]
pub struct SystemShell {}

impl SystemShell {
    fn command(command: &str) -> Command {
        let mut process = Command::new("bash");
        process.arg("-c").arg(command);
        process
    }
}

impl Shell for SystemShell {
    fn run(&self, command: &str) -> Result<i32, ShellError> {
        debug!("Running: {command}");
        let _guard = InterruptGuard::install();
        let status = SystemShell::command(command)
            .status()
            .map_err(|source| ShellError::Spawn {
                command: command.to_string(),
                source,
            })?;
        Ok(exit_code(status))
    }

    fn capture(&self, command: &str) -> Result<Captured, ShellError> {
        debug!("Capturing: {command}");
        let _guard = InterruptGuard::install();
        let output = SystemShell::command(command)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| ShellError::Spawn {
                command: command.to_string(),
                source,
            })?;
        let stdout =
            String::from_utf8(output.stdout).map_err(|_| ShellError::Encoding(command.to_string()))?;
        Ok(Captured {
            code: exit_code(output.status),
            stdout,
        })
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(unix)]
mod interrupt {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    static INTERRUPTED: AtomicBool = AtomicBool::new(false);
    // The number of live guards, and the handler the first one replaced.
    static INSTALLED: Mutex<(usize, libc::sighandler_t)> = Mutex::new((0, libc::SIG_DFL));

    extern "C" fn on_interrupt(_signal: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    /// Records `SIGINT` for as long as it is alive.
    /// Guards nest: the handler is installed by the first live guard, and the previous one restored when the last is
    /// dropped.
    #[derive(Debug)]
    pub struct InterruptGuard {}

    impl InterruptGuard {
        /// Start recording interrupts.
        pub fn install() -> Self {
            let mut installed = INSTALLED.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            if installed.0 == 0 {
                INTERRUPTED.store(false, Ordering::SeqCst);
                let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
                // SAFETY: the handler only touches an atomic.
                installed.1 = unsafe { libc::signal(libc::SIGINT, handler) };
            }

            installed.0 += 1;
            Self {}
        }

        /// Whether an interrupt arrived since the last check.
        pub fn interrupted(&self) -> bool {
            INTERRUPTED.swap(false, Ordering::SeqCst)
        }
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            let mut installed = INSTALLED.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            installed.0 -= 1;

            if installed.0 == 0 {
                // SAFETY: restores the handler replaced by the first guard.
                unsafe {
                    libc::signal(libc::SIGINT, installed.1);
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod interrupt {
    /// Interrupts are left to the platform default.
    #[derive(Debug)]
    pub struct InterruptGuard {}

    impl InterruptGuard {
        /// No-op.
        pub fn install() -> Self {
            Self {}
        }

        /// Always `false`.
        pub fn interrupted(&self) -> bool {
            false
        }
    }
}

pub use interrupt::InterruptGuard;

/// A shell which records each command line and answers from canned results, without running anything.
///
/// Clones share the same record.
///
/// ### Example
/// ```
/// use kslurm::shell::{Captured, RecordingShell, Shell};
///
/// let shell = RecordingShell::default().respond("squeue", Captured::ok("RUNNING\n"));
/// assert_eq!(shell.capture("squeue -h -j 42").unwrap().stdout, "RUNNING\n");
/// assert_eq!(shell.commands(), vec!["squeue -h -j 42".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingShell {
    commands: Rc<RefCell<Vec<String>>>,
    responses: Rc<RefCell<Vec<(String, Captured)>>>,
}

impl RecordingShell {
    /// Answer commands starting with `prefix` with `captured`.
    /// Earlier responses take precedence.
    pub fn respond(self, prefix: impl Into<String>, captured: Captured) -> Self {
        self.responses.borrow_mut().push((prefix.into(), captured));
        self
    }

    /// The commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    fn answer(&self, command: &str) -> Captured {
        self.commands.borrow_mut().push(command.to_string());
        self.responses
            .borrow()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, captured)| captured.clone())
            .unwrap_or_default()
    }
}

impl Shell for RecordingShell {
    fn run(&self, command: &str) -> Result<i32, ShellError> {
        Ok(self.answer(command).code)
    }

    fn capture(&self, command: &str) -> Result<Captured, ShellError> {
        Ok(self.answer(command))
    }
}

fn is_plain(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c))
}

/// Wrap `text` in single quotes.
pub fn single_quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Wrap `text` in double quotes, escaping the characters `bash` still expands inside them.
pub fn double_quoted(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');

    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }

    quoted.push('"');
    quoted
}

/// Quote `token` for `bash`, leaving plain tokens as they are.
pub fn quote(token: &str) -> Cow<'_, str> {
    if is_plain(token) {
        Cow::Borrowed(token)
    } else {
        Cow::Owned(single_quoted(token))
    }
}

/// Join `tokens` into a single command line.
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| quote(token.as_ref()).into_owned())
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ls", "ls")]
    #[case("/tmp/a-b_c.txt", "/tmp/a-b_c.txt")]
    #[case("--time=1-00:00:00", "--time=1-00:00:00")]
    #[case("", "''")]
    #[case("a b", "'a b'")]
    #[case("it's", r"'it'\''s'")]
    #[case("$HOME", "'$HOME'")]
    fn quoting(#[case] token: &str, #[case] expected: &str) {
        assert_eq!(quote(token), expected);
    }

    #[test]
    fn join_tokens() {
        assert_eq!(join(&["echo", "hello world", "x"]), "echo 'hello world' x");
        assert_eq!(join::<&str>(&[]), "");
    }

    #[test]
    fn recording() {
        // Setup
        let shell = RecordingShell::default()
            .respond("sbatch", Captured { code: 3, stdout: "12\n".to_string() })
            .respond("s", Captured::ok("other"));
        let observer = shell.clone();

        // Execute
        let code = shell.run("sbatch --parsable").unwrap();
        let captured = shell.capture("squeue").unwrap();
        let fallback = shell.capture("true").unwrap();

        // Verify
        assert_eq!(code, 3);
        assert_eq!(captured, Captured::ok("other"));
        assert_eq!(fallback, Captured::default());
        assert!(fallback.success());
        assert_eq!(
            observer.commands(),
            vec!["sbatch --parsable".to_string(), "squeue".to_string(), "true".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn system_shell() {
        let shell = SystemShell::default();
        assert_eq!(shell.run("exit 4").unwrap(), 4);
        assert_eq!(shell.capture("echo hi").unwrap(), Captured::ok("hi\n"));
    }

    #[test]
    fn interrupt_guard_starts_clear() {
        let guard = InterruptGuard::install();
        assert!(!guard.interrupted());
    }
}
