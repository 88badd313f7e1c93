use std::rc::Rc;
use thiserror::Error;

use crate::api::{Action, Model, Parameter, Signal, ValueError, Values};
use crate::constant::*;
use crate::doc;
use crate::matcher::Matcher;
use crate::parser::{
    middleware, ConfigError, ConsoleInterface, Engine, Parser, ParserMap, Printer, Row,
    UserInterface,
};

/// A failed command body.
/// The message is printed verbatim on standard error, and the command exits with `1`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

impl CommandError {
    /// Create a command error.
    pub fn new(message: impl Into<String>) -> Self {
        CommandError(message.into())
    }
}

impl From<ValueError> for CommandError {
    fn from(error: ValueError) -> Self {
        CommandError(error.to_string())
    }
}

/// The trailing tokens which a command does not parse itself.
///
/// ### Example
/// ```
/// use kslurm_args::Tail;
///
/// let tail = Tail::new()
///     .help("The command to submit.")
///     .required("Must provide a command");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tail {
    metavar: String,
    help: Option<String>,
    required: Option<String>,
}

impl Default for Tail {
    fn default() -> Self {
        Self {
            metavar: TAIL_METAVAR.to_string(),
            help: None,
            required: None,
        }
    }
}

impl Tail {
    /// An optional tail.
    pub fn new() -> Self {
        Tail::default()
    }

    /// Set the placeholder shown in help.
    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = metavar.into();
        self
    }

    /// Document the tail.
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help.replace(text.into());
        self
    }

    /// Require a non-empty tail, reporting `message` otherwise.
    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required.replace(message.into());
        self
    }

    fn usage(&self) -> String {
        let grammar = format!("{} ...", self.metavar);

        match self.required {
            Some(_) => format!("[{TERMINATOR}] {grammar}"),
            None => format!("[{TERMINATOR}] [{grammar}]"),
        }
    }

    fn row(&self) -> Row {
        Row::new(
            self.metavar.clone(),
            self.help.clone().unwrap_or_default(),
            None,
        )
    }
}

/// What a command body receives alongside its model: the sidecars of the invocation.
#[derive(Debug)]
pub struct Invocation {
    entry: String,
    tail: Vec<String>,
    parsers: ParserMap,
    help: String,
}

impl Invocation {
    pub(crate) fn new(entry: String, tail: Vec<String>, parsers: ParserMap, help: String) -> Self {
        Self {
            entry,
            tail,
            parsers,
            help,
        }
    }

    /// The entry name, including any parent commands (ex: `kapp pull`).
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// The tail tokens, verbatim and in input order.
    pub fn tail(&self) -> &[String] {
        &self.tail
    }

    /// The final parser states.
    pub fn parsers(&self) -> &ParserMap {
        &self.parsers
    }

    /// The rendered (unstyled) help.
    pub fn help(&self) -> &str {
        &self.help
    }
}

type Body = Rc<dyn Fn(&mut Values, &Invocation) -> Result<i32, CommandError>>;

/// A runnable command: its parameters, documentation, tail policy, nested commands, and body.
///
/// ### Example
/// ```
/// use kslurm_args::{Command, Tail};
///
/// let command = Command::new::<(), _>("echo", |_, invocation| {
///     println!("{}", invocation.tail().join(" "));
///     Ok(0)
/// })
/// .unwrap()
/// .tail(Tail::new())
/// .terminate_on_unknown();
///
/// let code = command.cli(vec!["echo".to_string(), "hello".to_string()]);
/// assert_eq!(code, 0);
/// ```
#[derive(Clone)]
pub struct Command {
    name: String,
    short: Option<String>,
    long: Option<String>,
    parameters: Vec<(String, Parameter)>,
    tail: Option<Tail>,
    terminate_on_unknown: bool,
    allow_unknown: bool,
    subcommands: Vec<Command>,
    body: Option<Body>,
    deferred_error: Option<ConfigError>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command{..}")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("tail", &self.tail)
            .field("subcommands", &self.subcommands)
            .finish()
    }
}

impl Command {
    /// Register the model `M` as a command named `name`, run by `body`.
    ///
    /// The model's doc text is read, its metadata applied to the declared parameters, and the parsers materialised.
    /// Any inconsistency is reported as a [`ConfigError`].
    pub fn new<M, F>(name: impl Into<String>, body: F) -> Result<Self, ConfigError>
    where
        M: Model + 'static,
        F: Fn(M, &Invocation) -> Result<i32, CommandError> + 'static,
    {
        let mut command = Command::declare(name, M::doc(), M::parameters()?)?;
        command.body.replace(Rc::new(move |values: &mut Values, invocation: &Invocation| {
            let model = M::from_values(values)?;
            body(model, invocation)
        }));
        Ok(command)
    }

    /// Register a command which only dispatches to its subcommands.
    pub fn group(name: impl Into<String>, doc: &str) -> Result<Self, ConfigError> {
        Command::declare(name, doc, Vec::default())
    }

    fn declare(
        name: impl Into<String>,
        text: &str,
        parameters: Vec<(&'static str, Parameter)>,
    ) -> Result<Self, ConfigError> {
        let doc = doc::read(text).map_err(|error| ConfigError(error.to_string()))?;
        let mut parameters: Vec<(String, Parameter)> = parameters
            .into_iter()
            .map(|(field, parameter)| (field.to_string(), parameter))
            .collect();

        for meta in &doc.meta {
            let parameter = match parameters.iter_mut().find(|(field, _)| field == &meta.field) {
                Some((_, parameter)) => parameter,
                None => {
                    return Err(ConfigError(format!(
                        "line {}: unknown field '{}' in '{}'.",
                        meta.line, meta.field, meta.text
                    )))
                }
            };

            parameter.update_meta(&meta.key, &meta.value).map_err(|message| {
                ConfigError(format!(
                    "line {}: unknown key '{}' in '{}': {message}.",
                    meta.line, meta.key, meta.text
                ))
            })?;
        }

        let command = Self {
            name: name.into(),
            short: doc.short,
            long: doc.long,
            parameters,
            tail: None,
            terminate_on_unknown: false,
            allow_unknown: false,
            subcommands: Vec::default(),
            body: None,
            deferred_error: None,
        };
        command.engine()?;
        Ok(command)
    }

    /// Accept trailing tokens; `--` then ends argument parsing.
    pub fn tail(mut self, tail: Tail) -> Self {
        self.tail.replace(tail);
        self
    }

    /// The first unrecognised token ends argument parsing, and it (plus everything after) goes to the tail.
    pub fn terminate_on_unknown(mut self) -> Self {
        self.terminate_on_unknown = true;
        self
    }

    /// Unrecognised tokens go to the tail, and argument parsing continues.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    /// Nest a command, selected by its name.
    /// Registration problems are reported when the command is run.
    pub fn subcommand(mut self, command: Command) -> Self {
        if self.subcommands.iter().any(|c| c.name == command.name) {
            self.deferred_error.replace(ConfigError(format!(
                "Cannot duplicate the sub-command '{}'.",
                command.name
            )));
        } else if let Some(error) = &command.deferred_error {
            self.deferred_error.replace(error.clone());
        }

        self.subcommands.push(command);

        if let Err(error) = self.engine() {
            self.deferred_error.replace(error);
        }

        self
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the command against `argv` (where `argv[0]` is the entry name), printing to the console.
    /// Returns the exit code.
    pub fn cli(&self, argv: Vec<String>) -> i32 {
        self.cli_with(argv, &ConsoleInterface::default())
    }

    /// Run the command against `argv` (where `argv[0]` is the entry name), printing to `user_interface`.
    /// Returns the exit code.
    pub fn cli_with(&self, argv: Vec<String>, user_interface: &dyn UserInterface) -> i32 {
        middleware::run(self, argv, user_interface)
    }

    pub(crate) fn deferred_error(&self) -> Option<&ConfigError> {
        self.deferred_error.as_ref()
    }

    pub(crate) fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub(crate) fn find(&self, name: &str) -> Option<&Command> {
        self.subcommands.iter().find(|c| c.name == name)
    }

    pub(crate) fn requires_tail(&self) -> Option<&str> {
        self.tail.as_ref().and_then(|tail| tail.required.as_deref())
    }

    /// The declared parameters, plus the subcommand selector when there are nested commands.
    pub(crate) fn parameters(&self) -> Vec<(String, Parameter)> {
        let mut parameters = self.parameters.clone();

        if !self.subcommands.is_empty() {
            let choices = self
                .subcommands
                .iter()
                .map(|command| (command.name.clone(), command.short.clone()));
            parameters.push((SUBCOMMAND_ID.to_string(), Parameter::subcommand(choices)));
        }

        parameters
    }

    pub(crate) fn engine(&self) -> Result<Engine, ConfigError> {
        let mut parsers = vec![Parser::new(
            HELP_ID,
            HELP_PRIORITY,
            Matcher::choice([format!("-{HELP_SHORT}"), format!("--{HELP_NAME}")]),
            Action::raises(Signal::HelpRequest),
        )];

        if self.tail.is_some() {
            parsers.push(Parser::new(
                TERMINATOR_ID,
                TERMINATOR_PRIORITY,
                Matcher::choice([TERMINATOR]).settings(false, None),
                Action::replace().terminal(),
            ));
        }

        for (field, parameter) in self.parameters() {
            parsers.extend(parameter.parsers(&field));
        }

        Ok(Engine::new(parsers)?
            .terminate_on_unknown(self.terminate_on_unknown)
            .allow_unknown(self.allow_unknown))
    }

    pub(crate) fn printer(&self, program: &str) -> Printer {
        let entries = self
            .parameters()
            .iter()
            .map(|(field, parameter)| parameter.entry(field))
            .collect();
        let tail = self.tail.as_ref().map(|tail| (tail.usage(), tail.row()));
        Printer::terminal(program, self.short.clone(), self.long.clone(), entries, tail)
    }
}
