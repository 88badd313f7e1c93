use std::path::PathBuf;

/// A raw token paired with its index in the argument vector.
pub type OffsetValue = (usize, String);

/// A converted parameter value.
///
/// Parsers are type-erased so that every parameter of a command can live in one map.
/// The typed view is recovered on read-back via [`FromValue`](./prelude/trait.FromValue.html).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean, typically produced by a flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A string.
    Str(String),
    /// A filesystem path.
    Path(PathBuf),
    /// The accumulated values of an append parser.
    List(Vec<Value>),
}

impl Value {
    /// The number of items held, where a scalar counts as one.
    pub fn len(&self) -> usize {
        match self {
            Value::List(items) => items.len(),
            _ => 1,
        }
    }

    /// Whether this is an empty list.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::Path(value) => write!(f, "{}", value.display()),
            Value::List(items) => write!(
                f,
                "[{}]",
                items
                    .iter()
                    .map(|item| item.to_string())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Value::Path(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

/// The declared type of a parameter.
/// Used to derive a formatter when the parameter's action does not bring its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `true`/`false`.
    Bool,
    /// A base-10 integer.
    Int,
    /// The token verbatim.
    Str,
    /// The token as a path.
    Path,
}

impl Kind {
    pub(crate) fn convert(&self, token: &str) -> Result<Value, String> {
        match self {
            Kind::Bool => match token.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("cannot convert '{token}' to a boolean.")),
            },
            Kind::Int => token
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("cannot convert '{token}' to an integer.")),
            Kind::Str => Ok(Value::Str(token.to_string())),
            Kind::Path => Ok(Value::Path(PathBuf::from(token))),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Kind::Bool, "true", Value::Bool(true))]
    #[case(Kind::Bool, "No", Value::Bool(false))]
    #[case(Kind::Int, "01", Value::Int(1))]
    #[case(Kind::Int, "-3", Value::Int(-3))]
    #[case(Kind::Str, "abc", Value::Str("abc".to_string()))]
    #[case(Kind::Path, "/tmp", Value::Path(PathBuf::from("/tmp")))]
    fn convert(#[case] kind: Kind, #[case] token: &str, #[case] expected: Value) {
        assert_eq!(kind.convert(token).unwrap(), expected);
    }

    #[rstest]
    #[case(Kind::Bool, "maybe")]
    #[case(Kind::Int, "1.5")]
    #[case(Kind::Int, "abc")]
    fn convert_invalid(#[case] kind: Kind, #[case] token: &str) {
        assert_matches!(kind.convert(token), Err(message) if message.contains(token));
    }

    #[test]
    fn display() {
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "[a, b]");
        assert_eq!(Value::from(3u32).to_string(), "3");
        assert_eq!(Value::List(vec![]).len(), 0);
        assert_eq!(Value::Bool(false).len(), 1);
    }
}
