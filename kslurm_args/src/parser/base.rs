use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::api::{Action, ActionError, Signal, ValidationError};
use crate::matcher::{Match, Matcher};
use crate::model::{OffsetValue, Value};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// A registration problem, reported before any token is matched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Config error: {0}")]
pub struct ConfigError(pub(crate) String);

/// A token which no parser claimed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected argument: {token}")]
pub struct TailError {
    /// The index of the token in the argument vector.
    pub offset: usize,
    /// The raw token.
    pub token: String,
}

/// The parsers of one command, keyed by id.
pub type ParserMap = HashMap<String, Parser>;

/// The runtime state of one matchable unit of a command.
///
/// Parsers are value-like: [`Parser::with_value`] returns an updated copy.
/// A parser with neither a value nor a validation error has never been assigned.
#[derive(Debug, Clone)]
pub struct Parser {
    id: String,
    priority: i32,
    terminal: bool,
    value: Option<Value>,
    raw_value: Vec<OffsetValue>,
    validation_err: Option<ValidationError>,
    matcher: Matcher,
    action: Action,
}

impl Parser {
    /// Create an unassigned parser.
    pub fn new(id: impl Into<String>, priority: i32, matcher: Matcher, action: Action) -> Self {
        Self {
            id: id.into(),
            priority,
            terminal: false,
            value: None,
            raw_value: Vec::default(),
            validation_err: None,
            matcher,
            action,
        }
    }

    /// The parser id, unique within a command.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Larger is matched first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the parser ends matching for its command.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// The formatted value, if any token was accepted.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The raw tokens (with their offsets) that were fed to this parser.
    pub fn raw_value(&self) -> &[OffsetValue] {
        &self.raw_value
    }

    /// The first rejection recorded for this parser.
    pub fn validation_err(&self) -> Option<&ValidationError> {
        self.validation_err.as_ref()
    }

    /// Whether any token was fed to this parser.
    pub fn is_assigned(&self) -> bool {
        self.value.is_some() || self.validation_err.is_some()
    }

    pub(crate) fn action(&self) -> &Action {
        &self.action
    }

    pub(crate) fn matches(&self, token: &str, context: &Context) -> Match {
        self.matcher.matches(token, self, context)
    }

    /// Feed a token to the parser.
    ///
    /// `raw` is the token as it appeared in the argument vector, while `token` is what the matcher
    /// produced (they differ for substituted matches).
    /// Returns the updated parser, or the signal its action raised.
    pub fn with_value(
        &self,
        raw: OffsetValue,
        token: &str,
        context: &Context,
    ) -> Result<Parser, Signal> {
        match self.action.apply(token, self, context) {
            Ok(value) => Ok(self.assign(raw, value)),
            Err(ActionError::Invalid(error)) => {
                let mut next = self.clone();
                next.raw_value.push(raw);

                if next.validation_err.is_none() {
                    next.validation_err.replace(error);
                }

                Ok(next)
            }
            Err(ActionError::Signal(signal)) => Err(signal),
        }
    }

    pub(crate) fn assign(&self, raw: OffsetValue, value: Value) -> Parser {
        let mut next = self.clone();
        next.raw_value.push(raw);
        next.value.replace(value);
        next.terminal = self.action.is_terminal();
        next
    }
}

/// An immutable snapshot of the engine for one matching step.
#[derive(Debug)]
pub struct Context<'a> {
    args: &'a [String],
    index: usize,
    parsers: &'a ParserMap,
    last_matched: Option<&'a Parser>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        args: &'a [String],
        index: usize,
        parsers: &'a ParserMap,
        last_matched: Option<&'a Parser>,
    ) -> Self {
        Self {
            args,
            index,
            parsers,
            last_matched,
        }
    }

    /// The full argument vector.
    pub fn args(&self) -> &[String] {
        self.args
    }

    /// The index of the token under consideration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Look up the current state of a parser.
    pub fn parser(&self, id: &str) -> Option<&Parser> {
        self.parsers.get(id)
    }

    /// The parser which claimed the previous matched token.
    pub fn last_matched(&self) -> Option<&Parser> {
        self.last_matched
    }
}

/// The outcome of running the engine over an argument vector.
#[derive(Debug)]
pub struct Consumed {
    /// The final parser states, keyed by id.
    pub parsers: ParserMap,
    /// The tokens left over for the command's tail, in input order.
    pub tail: Vec<OffsetValue>,
    /// Tokens that were not claimed and could not go to the tail.
    pub errors: Vec<TailError>,
    /// The signal that stopped matching, if any.
    pub signal: Option<Signal>,
    /// Which parser claimed each matched token: `(offset, parser id)`.
    pub bindings: Vec<(usize, String)>,
}

impl Consumed {
    /// The tail as plain tokens.
    pub fn tail_tokens(&self) -> Vec<String> {
        self.tail.iter().map(|(_, token)| token.clone()).collect()
    }
}

/// The priority-ordered matching loop.
///
/// For each token, the first parser (by descending priority, ties in declaration order) whose matcher
/// fires is fed the token.
/// Unclaimed tokens go to the tail or are reported, depending on `terminate_on_unknown` and `allow_unknown`.
/// The engine never backtracks.
#[derive(Debug, Clone)]
pub struct Engine {
    parsers: Vec<Parser>,
    terminate_on_unknown: bool,
    allow_unknown: bool,
}

impl Engine {
    /// Create an engine over `parsers`, whose ids must be unique.
    pub fn new(mut parsers: Vec<Parser>) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();

        for parser in &parsers {
            if !ids.insert(parser.id().to_string()) {
                return Err(ConfigError(format!(
                    "Cannot duplicate the parameter '{}'.",
                    parser.id()
                )));
            }
        }

        // Stable, so ties keep their declaration order.
        parsers.sort_by(|a, b| b.priority().cmp(&a.priority()));

        Ok(Self {
            parsers,
            terminate_on_unknown: false,
            allow_unknown: false,
        })
    }

    /// Send the first unclaimed token and everything after it to the tail.
    pub fn terminate_on_unknown(mut self, value: bool) -> Self {
        self.terminate_on_unknown = value;
        self
    }

    /// Send each unclaimed token to the tail, and keep matching.
    pub fn allow_unknown(mut self, value: bool) -> Self {
        self.allow_unknown = value;
        self
    }

    /// The parsers in matching order.
    pub fn parsers(&self) -> &[Parser] {
        &self.parsers
    }

    /// Run the matching loop over `args`.
    pub fn consume(&self, args: &[String]) -> Consumed {
        let mut states: ParserMap = self
            .parsers
            .iter()
            .map(|parser| (parser.id().to_string(), parser.clone()))
            .collect();
        let mut last_matched: Option<String> = None;
        let mut tail = Vec::default();
        let mut errors = Vec::default();
        let mut signal = None;
        let mut bindings = Vec::default();
        let mut index = 0;

        while index < args.len() {
            let token = &args[index];
            let outcome = {
                let context = Context::new(
                    args,
                    index,
                    &states,
                    last_matched.as_ref().and_then(|id| states.get(id)),
                );
                self.step(token, &states, &context)
            };

            match outcome {
                Some((id, Ok(updated))) => {
                    #[cfg(feature = "tracing_debug")]
                    {
                        debug!("Token '{token}' at {index} matched '{id}'.");
                    }

                    let terminal = updated.is_terminal();
                    bindings.push((index, id.clone()));
                    states.insert(id.clone(), updated);
                    last_matched.replace(id);

                    if terminal {
                        tail.extend(
                            args.iter()
                                .enumerate()
                                .skip(index + 1)
                                .map(|(offset, token)| (offset, token.clone())),
                        );
                        break;
                    }
                }
                Some((id, Err(raised))) => {
                    #[cfg(feature = "tracing_debug")]
                    {
                        debug!("Token '{token}' at {index} raised {raised:?}.");
                    }

                    bindings.push((index, id));
                    signal.replace(raised);
                    break;
                }
                None => {
                    if self.terminate_on_unknown {
                        tail.extend(
                            args.iter()
                                .enumerate()
                                .skip(index)
                                .map(|(offset, token)| (offset, token.clone())),
                        );
                        break;
                    } else if self.allow_unknown {
                        tail.push((index, token.clone()));
                    } else {
                        errors.push(TailError {
                            offset: index,
                            token: token.clone(),
                        });
                    }
                }
            }

            index += 1;
        }

        Consumed {
            parsers: states,
            tail,
            errors,
            signal,
            bindings,
        }
    }

    fn step(
        &self,
        token: &str,
        states: &ParserMap,
        context: &Context,
    ) -> Option<(String, Result<Parser, Signal>)> {
        for template in &self.parsers {
            let current = match states.get(template.id()) {
                Some(current) => current,
                None => unreachable!("internal error - parser '{}' must exist", template.id()),
            };
            let substituted = match current.matches(token, context) {
                Match::No => continue,
                Match::Yes => token.to_string(),
                Match::Substitute(substitute) => substitute,
            };
            let raw = (context.index(), token.to_string());

            return Some((
                current.id().to_string(),
                current.with_value(raw, &substituted, context),
            ));
        }

        None
    }
}
