//! Reader for command doc text.
//!
//! The first paragraph is the short description, and the remaining paragraphs (up to the first metadata line)
//! are the long description.
//! Metadata lines take the form `@<field>.<key>[.<sub>] <value>`.
//! Following lines without an `@` continue the value: `help` joins them into one paragraph, while
//! `help.examples` takes one example per line.
use thiserror::Error;

/// A doc text which could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocError {
    /// A metadata line without a `<field>.<key>` path.
    #[error("line {line}: malformed metadata '{text}'")]
    Malformed {
        /// The 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Meta {
    pub(crate) line: usize,
    pub(crate) field: String,
    pub(crate) key: String,
    pub(crate) value: String,
    pub(crate) text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Doc {
    pub(crate) short: Option<String>,
    pub(crate) long: Option<String>,
    pub(crate) meta: Vec<Meta>,
}

pub(crate) fn read(text: &str) -> Result<Doc, DocError> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::default();
    let mut current: Vec<&str> = Vec::default();
    let mut meta: Vec<Meta> = Vec::default();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();

        if let Some(path_value) = line.strip_prefix('@') {
            let (path, value) = match path_value.split_once(char::is_whitespace) {
                Some((path, value)) => (path, value.trim()),
                None => (path_value, ""),
            };

            match path.split_once('.') {
                Some((field, key)) if !field.is_empty() && !key.is_empty() => {
                    meta.push(Meta {
                        line: i + 1,
                        field: field.to_string(),
                        key: key.to_string(),
                        value: value.to_string(),
                        text: line.to_string(),
                    });
                }
                _ => {
                    return Err(DocError::Malformed {
                        line: i + 1,
                        text: line.to_string(),
                    })
                }
            }
        } else if let Some(last) = meta.last_mut() {
            if !line.is_empty() {
                let separator = if last.key == "help.examples" { "\n" } else { " " };

                if !last.value.is_empty() {
                    last.value.push_str(separator);
                }

                last.value.push_str(line);
            }
        } else if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    let mut paragraphs = paragraphs.into_iter().map(|lines| lines.join(" "));
    let short = paragraphs.next();
    let rest: Vec<String> = paragraphs.collect();
    let long = if rest.is_empty() {
        None
    } else {
        Some(rest.join("\n\n"))
    };

    Ok(Doc { short, long, meta })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        assert_eq!(read("").unwrap(), Doc::default());
        assert_eq!(read("\n   \n").unwrap(), Doc::default());
    }

    #[test]
    fn descriptions() {
        // Setup
        let text = "Submit a batch job.
            Wraps sbatch.

            Resources are given as shapes,
            in any order.

            A third paragraph.";

        // Execute
        let doc = read(text).unwrap();

        // Verify
        assert_eq!(doc.short, Some("Submit a batch job. Wraps sbatch.".to_string()));
        assert_eq!(
            doc.long,
            Some("Resources are given as shapes, in any order.\n\nA third paragraph.".to_string())
        );
        assert!(doc.meta.is_empty());
    }

    #[test]
    fn metadata() {
        // Setup
        let text = "Short.

            @time.help The time limit,
                given as hours and minutes.
            @time.help.examples 07:23
                1-00:00
            @account.metavar ACCOUNT
            @gpu.name";

        // Execute
        let doc = read(text).unwrap();

        // Verify
        assert_eq!(doc.short, Some("Short.".to_string()));
        assert_eq!(doc.long, None);
        let entries: Vec<(usize, &str, &str, &str)> = doc
            .meta
            .iter()
            .map(|m| (m.line, m.field.as_str(), m.key.as_str(), m.value.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (3, "time", "help", "The time limit, given as hours and minutes."),
                (5, "time", "help.examples", "07:23\n1-00:00"),
                (7, "account", "metavar", "ACCOUNT"),
                (8, "gpu", "name", ""),
            ]
        );
    }

    #[test]
    fn malformed() {
        let result = read("Short.\n@time value");
        assert_eq!(
            result,
            Err(DocError::Malformed {
                line: 2,
                text: "@time value".to_string()
            })
        );
        assert_matches!(read("@.help x"), Err(DocError::Malformed { line: 1, .. }));
    }
}
