/// The verdict of a [`Matcher`](./struct.Matcher.html) on a single token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// The token does not belong to the parser.
    No,
    /// The token belongs to the parser, and is fed to its action verbatim.
    Yes,
    /// The token belongs to the parser, but the action receives this substitute instead.
    /// Used to split `--key=value` style tokens.
    Substitute(String),
}

impl Match {
    /// Whether the token was claimed.
    pub fn is_match(&self) -> bool {
        !matches!(self, Match::No)
    }
}

impl From<bool> for Match {
    fn from(value: bool) -> Self {
        if value {
            Match::Yes
        } else {
            Match::No
        }
    }
}

/// The duplicate & length policy shared by every matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) duplicates: bool,
    pub(crate) max_len: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            duplicates: true,
            max_len: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bool() {
        assert_eq!(Match::from(true), Match::Yes);
        assert_eq!(Match::from(false), Match::No);
        assert!(Match::Substitute("x".to_string()).is_match());
        assert!(!Match::No.is_match());
    }

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert!(settings.duplicates);
        assert_eq!(settings.max_len, None);
    }
}
