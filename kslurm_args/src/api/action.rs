use std::rc::Rc;
use thiserror::Error;

use crate::model::{Kind, Value};
use crate::parser::{Context, Parser};

/// A control-flow request raised during matching.
/// Unlike validation errors, a signal short-circuits the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The help switch was matched.
    HelpRequest,
}

/// A rejected token.
///
/// The message is a template: `{label}` is substituted with the parameter's label when the error is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{template}")]
pub struct ValidationError {
    template: String,
}

impl ValidationError {
    /// Create a validation error from a message template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the message for the parameter `label`.
    pub fn render(&self, label: &str) -> String {
        self.template.replace("{label}", label)
    }
}

#[derive(Debug)]
pub(crate) enum ActionError {
    Invalid(ValidationError),
    Signal(Signal),
}

type Formatter = Rc<dyn Fn(&str, &Parser, &Context) -> Result<Value, ValidationError>>;
type Validator = Rc<dyn Fn(&str) -> Result<(), ValidationError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Replace,
    Append,
    Raises(Signal),
}

/// How a matched token updates a parser's value.
///
/// An action is a `(formatter, validator)` pair composed under one of three modes:
/// * [`Action::replace`]: the formatted token overwrites the value.
/// * [`Action::append`]: the formatted token is pushed onto a list.
/// * [`Action::raises`]: the token unconditionally raises a [`Signal`].
///
/// When no formatter is set, the one for the parameter's declared [`Kind`] is injected at registration.
///
/// ### Example
/// ```
/// use kslurm_args::{Action, Value};
///
/// let action = Action::replace()
///     .validate(|token| {
///         if token.starts_with('-') {
///             Err("'{label}' cannot be negative.".to_string())
///         } else {
///             Ok(())
///         }
///     })
///     .convert(|token| Ok(Value::Int(token.len() as i64)));
/// assert!(action.has_formatter());
/// ```
#[derive(Clone)]
pub struct Action {
    mode: Mode,
    formatter: Option<Formatter>,
    validators: Vec<Validator>,
    terminal: bool,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action{..}")
            .field("mode", &self.mode)
            .field("formatter", &self.formatter.is_some())
            .field("validators", &self.validators.len())
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl Action {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            formatter: None,
            validators: Vec::default(),
            terminal: false,
        }
    }

    /// Each matched token overwrites the previous value.
    pub fn replace() -> Self {
        Action::new(Mode::Replace)
    }

    /// Each matched token is pushed onto the value list, in input order.
    pub fn append() -> Self {
        Action::new(Mode::Append)
    }

    /// Any matched token raises `signal`.
    pub fn raises(signal: Signal) -> Self {
        Action::new(Mode::Raises(signal))
    }

    /// Lift a plain conversion `token -> Value` into the formatter.
    /// The error message may reference `{label}`.
    pub fn convert<F>(self, converter: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + 'static,
    {
        self.format(move |token, _, _| converter(token).map_err(ValidationError::new))
    }

    /// Set a formatter with access to the parser and the engine context.
    pub fn format<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str, &Parser, &Context) -> Result<Value, ValidationError> + 'static,
    {
        self.formatter.replace(Rc::new(formatter));
        self
    }

    /// Add a pre-check, run before formatting.
    /// Checks run in the order added; the first failure wins.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + 'static,
    {
        self.validators
            .push(Rc::new(move |token| validator(token).map_err(ValidationError::new)));
        self
    }

    /// Mark the parser terminal once it takes a value.
    /// The remaining tokens are then sent to the tail.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Whether the action marks its parser terminal.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether a formatter has been set.
    pub fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }

    pub(crate) fn is_append(&self) -> bool {
        self.mode == Mode::Append
    }

    pub(crate) fn or_formatter(self, kind: Kind) -> Self {
        if self.has_formatter() {
            self
        } else {
            self.convert(move |token| kind.convert(token))
        }
    }

    pub(crate) fn apply(
        &self,
        token: &str,
        parser: &Parser,
        context: &Context,
    ) -> Result<Value, ActionError> {
        if let Mode::Raises(signal) = self.mode {
            return Err(ActionError::Signal(signal));
        }

        for validator in &self.validators {
            validator(token).map_err(ActionError::Invalid)?;
        }

        let value = match &self.formatter {
            Some(formatter) => formatter(token, parser, context).map_err(ActionError::Invalid)?,
            None => Value::Str(token.to_string()),
        };

        match self.mode {
            Mode::Replace => Ok(value),
            Mode::Append => {
                let mut items = match parser.value() {
                    Some(Value::List(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                    None => Vec::default(),
                };
                items.push(value);
                Ok(Value::List(items))
            }
            Mode::Raises(_) => unreachable!("internal error - raising actions do not format"),
        }
    }
}
