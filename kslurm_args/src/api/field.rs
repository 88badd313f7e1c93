use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::api::Parameter;
use crate::model::Value;
use crate::parser::ConfigError;
use crate::prelude::FromValue;

/// A read-back mismatch between a [`Model`] and its declared parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The field was never declared by the model.
    #[error("field '{0}' was not declared")]
    Undeclared(String),
    /// The field has no value, and was not taken as optional.
    #[error("field '{0}' has no value")]
    Missing(String),
    /// The field holds a value of a different shape.
    #[error("field '{field}' is not a {expected}")]
    Mismatch {
        /// The field name.
        field: String,
        /// The shape asked for.
        expected: &'static str,
    },
}

/// The values read back from a command line, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct Values {
    values: HashMap<String, Option<Value>>,
    provided: HashSet<String>,
}

impl Values {
    pub(crate) fn new(values: HashMap<String, Option<Value>>, provided: HashSet<String>) -> Self {
        Self { values, provided }
    }

    /// Take the value of a mandatory (or defaulted) field.
    pub fn take<T: FromValue>(&mut self, field: &str) -> Result<T, ValueError> {
        self.take_optional(field)?
            .ok_or_else(|| ValueError::Missing(field.to_string()))
    }

    /// Take the value of an optional field.
    pub fn take_optional<T: FromValue>(&mut self, field: &str) -> Result<Option<T>, ValueError> {
        match self.values.remove(field) {
            Some(Some(value)) => T::from_value(value)
                .map(Some)
                .ok_or_else(|| ValueError::Mismatch {
                    field: field.to_string(),
                    expected: T::expected(),
                }),
            Some(None) => Ok(None),
            None => Err(ValueError::Undeclared(field.to_string())),
        }
    }

    /// Whether the field was given on the command line (rather than defaulted).
    pub fn is_provided(&self, field: &str) -> bool {
        self.provided.contains(field)
    }
}

/// Behaviour of a command record: its parameters, its documentation, and how it is built back from [`Values`].
///
/// ### Example
/// ```
/// use kslurm_args::{ConfigError, Model, Parameter, ValueError, Values};
///
/// struct Pull {
///     uri: String,
///     alias: Option<String>,
/// }
///
/// impl Model for Pull {
///     fn doc() -> &'static str {
///         "Pull a container image.
///
///         @alias.metavar ALIAS"
///     }
///
///     fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
///         Ok(vec![
///             ("uri", Parameter::positional().help("The image uri.")),
///             ("alias", Parameter::keyword(["-a", "--alias"]).optional()),
///         ])
///     }
///
///     fn from_values(values: &mut Values) -> Result<Self, ValueError> {
///         Ok(Pull {
///             uri: values.take("uri")?,
///             alias: values.take_optional("alias")?,
///         })
///     }
/// }
/// ```
pub trait Model: Sized {
    /// The doc text: a short description, an optional long description, and `@field.key value` metadata lines.
    fn doc() -> &'static str {
        ""
    }

    /// The declared parameters, in declaration order.
    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError>;

    /// Build the record from its read-back values.
    fn from_values(values: &mut Values) -> Result<Self, ValueError>;
}

impl Model for () {
    fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(Vec::default())
    }

    fn from_values(_values: &mut Values) -> Result<Self, ValueError> {
        Ok(())
    }
}
