use colored::Colorize;
use terminal_size::{terminal_size, Width};

use crate::constant::*;
use crate::parser::interface::{ColumnRenderer, RenderError};

/// The help template class of a parameter.
/// Sections are printed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Class {
    Positional,
    Shape,
    Keyword,
    Flag,
    Subcommand,
}

impl Class {
    const ALL: [Class; 5] = [
        Class::Positional,
        Class::Shape,
        Class::Keyword,
        Class::Flag,
        Class::Subcommand,
    ];

    fn title(&self) -> &'static str {
        match self {
            Class::Positional => "Positional arguments",
            Class::Shape => "Shapes",
            Class::Keyword => "Options",
            Class::Flag => "Flags",
            Class::Subcommand => "Commands",
        }
    }

    /// Whether the template understands the metadata `key` beyond the common ones.
    pub(crate) fn accepts(&self, key: &str) -> bool {
        match self {
            Class::Positional | Class::Keyword => key == "metavar",
            _ => false,
        }
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Class::Positional => "positional",
            Class::Shape => "shape",
            Class::Keyword => "keyword",
            Class::Flag => "flag",
            Class::Subcommand => "subcommand",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Row {
    left: String,
    help: String,
    default: Option<String>,
}

impl Row {
    pub(crate) fn new(left: String, help: String, default: Option<String>) -> Self {
        Self {
            left,
            help,
            default,
        }
    }

    #[cfg(test)]
    pub(crate) fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    class: Class,
    usage: String,
    rows: Vec<Row>,
}

impl Entry {
    pub(crate) fn new(class: Class, usage: String, rows: Vec<Row>) -> Self {
        Self { class, usage, rows }
    }

    #[cfg(test)]
    pub(crate) fn usage(&self) -> &str {
        &self.usage
    }

    #[cfg(test)]
    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }
}

const PADDING_WIDTH: usize = 2;

/// Renders the usage line & the help document of one command.
#[derive(Debug)]
pub(crate) struct Printer {
    program: String,
    short: Option<String>,
    long: Option<String>,
    entries: Vec<Entry>,
    tail: Option<(String, Row)>,
    terminal_width: Option<usize>,
}

impl Printer {
    pub(crate) fn terminal(
        program: impl Into<String>,
        short: Option<String>,
        long: Option<String>,
        entries: Vec<Entry>,
        tail: Option<(String, Row)>,
    ) -> Self {
        let terminal_width = terminal_size().map(|(Width(width), _)| width as usize);
        Printer::new(program, short, long, entries, tail, terminal_width)
    }

    pub(crate) fn new(
        program: impl Into<String>,
        short: Option<String>,
        long: Option<String>,
        entries: Vec<Entry>,
        tail: Option<(String, Row)>,
        terminal_width: Option<usize>,
    ) -> Self {
        Self {
            program: program.into(),
            short,
            long,
            entries,
            tail,
            terminal_width,
        }
    }

    pub(crate) fn usage(&self) -> String {
        let mut parts = vec![
            "USAGE:".to_string(),
            self.program.clone(),
            format!("[-{HELP_SHORT}]"),
        ];

        parts.extend(self.entries.iter().map(|entry| entry.usage.clone()));

        if let Some((usage, _)) = &self.tail {
            parts.push(usage.clone());
        }

        parts.join(" ")
    }

    fn sections(&self) -> Vec<(Class, Vec<Row>)> {
        let help = Row::new(
            format!("-{HELP_SHORT}, --{HELP_NAME}"),
            HELP_MESSAGE.to_string(),
            None,
        );

        Class::ALL
            .iter()
            .filter_map(|class| {
                let mut rows: Vec<Row> = self
                    .entries
                    .iter()
                    .filter(|entry| &entry.class == class)
                    .flat_map(|entry| entry.rows.clone())
                    .collect();

                match class {
                    Class::Positional => {
                        if let Some((_, row)) = &self.tail {
                            rows.push(row.clone());
                        }
                    }
                    Class::Flag => rows.insert(0, help.clone()),
                    _ => {}
                }

                if rows.is_empty() {
                    None
                } else {
                    Some((*class, rows))
                }
            })
            .collect()
    }

    pub(crate) fn help(&self, styled: bool) -> Result<String, RenderError> {
        let sections = self.sections();
        let rows = sections.iter().flat_map(|(_, rows)| rows.iter());
        let left = rows.clone().map(|row| row.left.chars().count()).max().unwrap_or(0);
        let middle = rows.clone().map(|row| row.help.chars().count()).max().unwrap_or(0);
        let right = rows
            .map(|row| row.default.as_ref().map(|d| d.chars().count()).unwrap_or(0))
            .max()
            .unwrap_or(0);
        let renderer = ColumnRenderer::guided(PADDING_WIDTH, left, middle, right, self.terminal_width)?;
        let title = |text: &str| {
            if styled {
                text.bold().to_string()
            } else {
                text.to_string()
            }
        };

        let mut lines = vec![self.usage()];

        for paragraph in [&self.short, &self.long].into_iter().flatten() {
            lines.push(String::default());
            lines.push(paragraph.clone());
        }

        for (class, rows) in sections {
            lines.push(String::default());
            lines.push(title(&format!("{}:", class.title())));

            for row in rows {
                lines.extend(renderer.render(&row.left, &row.help, row.default.as_deref()));
            }
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer(entries: Vec<Entry>, tail: Option<(String, Row)>) -> Printer {
        Printer::new(
            "kbatch",
            Some("Submit a batch job.".to_string()),
            None,
            entries,
            tail,
            Some(100),
        )
    }

    fn entry(class: Class, usage: &str, left: &str, help: &str, default: Option<&str>) -> Entry {
        Entry::new(
            class,
            usage.to_string(),
            vec![Row::new(
                left.to_string(),
                help.to_string(),
                default.map(str::to_string),
            )],
        )
    }

    #[test]
    fn usage_empty() {
        let printer = Printer::new("program", None, None, vec![], None, None);
        assert_eq!(printer.usage(), "USAGE: program [-h]");
    }

    #[test]
    fn usage_in_declaration_order() {
        // Setup
        let printer = printer(
            vec![
                entry(Class::Flag, "[gpu]", "gpu", "", None),
                entry(Class::Shape, "[[d-]hh:mm]", "[d-]hh:mm", "", None),
                entry(Class::Keyword, "[-a ACCOUNT]", "-a ACCOUNT", "", None),
            ],
            Some((
                "[--] COMMAND ...".to_string(),
                Row::new("COMMAND".to_string(), String::default(), None),
            )),
        );

        // Execute
        let usage = printer.usage();

        // Verify
        assert_eq!(
            usage,
            "USAGE: kbatch [-h] [gpu] [[d-]hh:mm] [-a ACCOUNT] [--] COMMAND ..."
        );
    }

    #[test]
    fn help() {
        // Setup
        let printer = printer(
            vec![
                entry(Class::Flag, "[gpu]", "gpu", "Request a gpu.", None),
                entry(
                    Class::Shape,
                    "[[d-]hh:mm]",
                    "[d-]hh:mm",
                    "The time limit.",
                    Some("[default: 180]"),
                ),
            ],
            Some((
                "COMMAND ...".to_string(),
                Row::new("COMMAND".to_string(), "The command.".to_string(), None),
            )),
        );

        // Execute
        let help = printer.help(false).unwrap();

        // Verify
        assert_eq!(
            help,
            "USAGE: kbatch [-h] [gpu] [[d-]hh:mm] COMMAND ...

Submit a batch job.

Positional arguments:
     COMMAND  The command.

Shapes:
   [d-]hh:mm  The time limit.                   [default: 180]

Flags:
  -h, --help  Show this help message and exit.
         gpu  Request a gpu."
        );
    }

    #[test]
    fn help_idempotent() {
        let printer = printer(
            vec![entry(Class::Keyword, "[-a A]", "-a A", "Account.", None)],
            None,
        );
        assert_eq!(printer.help(false).unwrap(), printer.help(false).unwrap());
    }

    #[test]
    fn help_styled() {
        let printer = printer(vec![], None);
        let help = printer.help(true).unwrap();
        crate::test::assert_contains!(help, "USAGE: kbatch [-h]");
        crate::test::assert_contains!(help, "Submit a batch job.");
    }

    #[test]
    fn accepts() {
        assert!(Class::Keyword.accepts("metavar"));
        assert!(Class::Positional.accepts("metavar"));
        assert!(!Class::Flag.accepts("metavar"));
        assert!(!Class::Shape.accepts("other"));
    }
}
