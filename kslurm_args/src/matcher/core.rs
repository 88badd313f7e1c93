use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;

use regex::Regex;

use crate::matcher::model::*;
use crate::parser::{ConfigError, Context, Parser};

type Predicate = Rc<dyn Fn(&str, &Parser, &Context) -> Match>;

/// A predicate deciding whether a raw token belongs to a [`Parser`].
///
/// Matchers are evaluated in priority order by the engine, and the first to claim a token wins.
/// Since the engine never backtracks, a matcher must know when it should *not* fire.
/// The [`Matcher::settings`] guards cover the common cases (a filled scalar, a full list).
///
/// ### Example
/// ```
/// use kslurm_args::Matcher;
///
/// // Claims `gpu`, but only the first time.
/// let matcher = Matcher::choice(["gpu"]).settings(false, None);
/// ```
#[derive(Clone)]
pub struct Matcher {
    predicate: Predicate,
    settings: Settings,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher{..}")
            .field("duplicates", &self.settings.duplicates)
            .field("max_len", &self.settings.max_len)
            .finish()
    }
}

impl Matcher {
    /// Create a matcher from an arbitrary predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&str, &Parser, &Context) -> Match + 'static,
    {
        Self {
            predicate: Rc::new(predicate),
            settings: Settings::default(),
        }
    }

    /// Claim tokens which are one of `choices`.
    pub fn choice<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices: HashSet<String> = choices.into_iter().map(Into::into).collect();
        Matcher::new(move |token, _, _| Match::from(choices.contains(token)))
    }

    /// Claim tokens matching the regular expression `pattern`.
    /// The pattern is used as written, so anchor it (`^..$`) to match whole tokens.
    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern)
            .map_err(|error| ConfigError(format!("invalid pattern '{pattern}': {error}")))?;
        Ok(Matcher::new(move |token, _, _| {
            Match::from(regex.is_match(token))
        }))
    }

    /// Claim tokens naming an existing filesystem entry (a directory, when `is_dir`).
    pub fn path(is_dir: bool) -> Self {
        Matcher::new(move |token, _, _| {
            let path = Path::new(token);
            Match::from(if is_dir { path.is_dir() } else { path.exists() })
        })
    }

    /// Claim every token.
    pub fn everything() -> Self {
        Matcher::new(|_, _, _| Match::Yes)
    }

    /// Claim `--name=value` tokens for any of the `names`, substituting the `value`.
    pub fn inline<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        Matcher::new(move |token, _, _| match token.split_once('=') {
            Some((name, value)) if names.contains(name) => Match::Substitute(value.to_string()),
            _ => Match::No,
        })
    }

    /// Claim tokens that directly follow the parser `initializer`.
    ///
    /// Fires only while the most recently matched parser is either `initializer`, or the parser
    /// this matcher is attached to, and every token since `initializer` belongs to the chain.
    /// At most `number` tokens are claimed per chain (unbounded when `None`).
    /// Each candidate token must also satisfy `inner`.
    pub fn option_chain(initializer: impl Into<String>, number: Option<usize>, inner: Matcher) -> Self {
        let initializer = initializer.into();
        Matcher::new(move |token, parser, context| {
            let last = match context.last_matched() {
                Some(last) => last,
                None => return Match::No,
            };

            if last.id() != initializer && last.id() != parser.id() {
                return Match::No;
            }

            let opened = match context
                .parser(&initializer)
                .and_then(|p| p.raw_value().last())
            {
                Some((offset, _)) if *offset < context.index() => *offset,
                _ => return Match::No,
            };
            let consumed = parser
                .raw_value()
                .iter()
                .filter(|(offset, _)| *offset > opened)
                .count();

            // Every token since the initializer must belong to this chain.
            if opened + consumed + 1 != context.index() {
                return Match::No;
            }

            if let Some(limit) = number {
                if consumed >= limit {
                    return Match::No;
                }
            }

            inner.matches(token, parser, context)
        })
    }

    /// Try this matcher, falling back to `other` when it does not fire.
    pub fn or(self, other: Matcher) -> Self {
        Matcher::new(move |token, parser, context| {
            let first = self.matches(token, parser, context);

            if first.is_match() {
                first
            } else {
                other.matches(token, parser, context)
            }
        })
    }

    /// Configure the duplicate & length policy.
    ///
    /// When `duplicates` is false, the matcher refuses tokens once its parser has been assigned.
    /// When `max_len` is set, the matcher refuses tokens once its (append) parser holds that many values.
    pub fn settings(mut self, duplicates: bool, max_len: Option<usize>) -> Self {
        self.settings = Settings {
            duplicates,
            max_len,
        };
        self
    }

    /// Evaluate the matcher against a token.
    pub fn matches(&self, token: &str, parser: &Parser, context: &Context) -> Match {
        if !self.settings.duplicates && parser.is_assigned() {
            return Match::No;
        }

        if let (Some(max_len), Some(value)) = (self.settings.max_len, parser.value()) {
            if value.len() >= max_len {
                return Match::No;
            }
        }

        (self.predicate)(token, parser, context)
    }
}
