//! Traits which, typically, may be imported without concern: `use kslurm_args::prelude::*`.
use std::path::PathBuf;

use crate::model::Value;

/// Behaviour to recover a typed value from a type-erased [`Value`].
// Needs to be imported in order to implement a custom read-back type.
pub trait FromValue: Sized {
    /// Convert, or `None` when the value has a different shape.
    fn from_value(value: Value) -> Option<Self>;

    /// Human name of the expected shape, used in error messages.
    fn expected() -> &'static str;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }

    fn expected() -> &'static str {
        "any value"
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    fn expected() -> &'static str {
        "bool"
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    fn expected() -> &'static str {
        "integer"
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => u32::try_from(i).ok(),
            _ => None,
        }
    }

    fn expected() -> &'static str {
        "unsigned integer"
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s),
            Value::Path(p) => Some(p.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    fn expected() -> &'static str {
        "string"
    }
}

impl FromValue for PathBuf {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Path(p) => Some(p),
            Value::Str(s) => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    fn expected() -> &'static str {
        "path"
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            // A scalar read as a collection is a single item.
            other => T::from_value(other).map(|item| vec![item]),
        }
    }

    fn expected() -> &'static str {
        "list"
    }
}
