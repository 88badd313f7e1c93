use std::collections::HashSet;
use thiserror::Error;

use crate::api::{Action, ValidationError};
use crate::constant::*;
use crate::matcher::Matcher;
use crate::model::{Kind, Value};
use crate::parser::{Class, Entry, Parser, ParserMap, Row};

/// A parameter which could not be read back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// No token matched, and there is no default.
    #[error("'{label}' has not been provided a value{}", snippet(.help))]
    Mandatory {
        /// The parameter label.
        label: String,
        /// The parameter help, if any.
        help: Option<String>,
    },
    /// A matched token was rejected.
    #[error("Invalid value for '{label}': {message}")]
    Invalid {
        /// The parameter label.
        label: String,
        /// The rendered validation message.
        message: String,
    },
    /// A mandatory tail is empty.
    #[error("{0}")]
    MissingTail(String),
}

fn snippet(help: &Option<String>) -> String {
    match help {
        Some(help) => format!(" ({help})"),
        None => String::default(),
    }
}

/// The help metadata of a parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Help {
    pub(crate) text: Option<String>,
    pub(crate) syntax: Option<String>,
    pub(crate) examples: Vec<String>,
    pub(crate) metavar: Option<String>,
}

/// A declarative field of a command.
///
/// Each parameter produces one or more [`Parser`]s (with ids derived from its field name), reads their state
/// back into a value, and describes itself for the help message.
///
/// The kinds are:
/// * [`Parameter::shape`]: claims tokens of a recognisable form, anywhere in the input.
/// * [`Parameter::flag`]: a boolean switch.
/// * [`Parameter::keyword`] & [`Parameter::keyword_list`]: a switch followed by its values.
/// * [`Parameter::positional`]: the lowest priority catch-all.
/// * [`Parameter::subcommand`]: selects a nested command, sending the remaining tokens to it.
///
/// ### Example
/// ```
/// use kslurm_args::{Matcher, Parameter};
///
/// let cpu = Parameter::shape(Matcher::regex(r"^[0-9]+$").unwrap())
///     .help("Number of cpus.")
///     .default(1u32);
/// let account = Parameter::keyword(["-a", "--account"]).metavar("ACCOUNT");
/// ```
#[derive(Debug, Clone)]
pub struct Parameter {
    class: Class,
    names: Vec<String>,
    choices: Vec<(String, Option<String>)>,
    label: Option<String>,
    matcher: Matcher,
    action: Action,
    kind: Kind,
    num: Option<usize>,
    default: Option<Value>,
    optional: bool,
    duplicates: bool,
    priority: i32,
    help: Help,
}

impl Parameter {
    fn new(class: Class, matcher: Matcher, action: Action, kind: Kind, priority: i32) -> Self {
        Self {
            class,
            names: Vec::default(),
            choices: Vec::default(),
            label: None,
            matcher,
            action,
            kind,
            num: None,
            default: None,
            optional: false,
            duplicates: false,
            priority,
            help: Help::default(),
        }
    }

    /// A parameter claiming any token that satisfies `matcher`, wherever it appears.
    /// Only the first such token is claimed.
    pub fn shape(matcher: Matcher) -> Self {
        Parameter::new(
            Class::Shape,
            matcher,
            Action::replace(),
            Kind::Str,
            SHAPE_PRIORITY,
        )
    }

    /// A boolean switch, `false` unless one of `names` is present.
    pub fn flag<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut parameter = Parameter::new(
            Class::Flag,
            Matcher::choice(names.clone()),
            Action::replace().convert(|_| Ok(Value::Bool(true))),
            Kind::Bool,
            FLAG_PRIORITY,
        );
        parameter.names = names;
        parameter.duplicates = true;
        parameter.default = Some(Value::Bool(false));
        parameter
    }

    /// A switch taking exactly one value: `-a value` or `--account=value`.
    /// Repeats replace the earlier value.
    pub fn keyword<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Parameter::keyword_with(names, Some(1), Action::replace())
    }

    /// A switch taking `num` values (any number, when `None`).
    /// Values from repeats accumulate in input order.
    pub fn keyword_list<I, S>(names: I, num: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Parameter::keyword_with(names, num, Action::append())
    }

    fn keyword_with<I, S>(names: I, num: Option<usize>, action: Action) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut parameter = Parameter::new(
            Class::Keyword,
            Matcher::everything(),
            action,
            Kind::Str,
            KEYWORD_PRIORITY,
        );
        parameter.names = names;
        parameter.num = num;
        parameter.duplicates = true;
        parameter
    }

    /// A parameter taking the first token no other parameter claims.
    pub fn positional() -> Self {
        Parameter::new(
            Class::Positional,
            Matcher::everything(),
            Action::replace(),
            Kind::Str,
            POSITIONAL_PRIORITY,
        )
    }

    /// A parameter selecting one of the nested commands `choices`.
    /// Once selected, every following token is left for the nested command.
    pub fn subcommand<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<String>)>,
        S: Into<String>,
    {
        let choices: Vec<(String, Option<String>)> = choices
            .into_iter()
            .map(|(choice, description)| (choice.into(), description))
            .collect();
        let mut parameter = Parameter::new(
            Class::Subcommand,
            Matcher::choice(choices.iter().map(|(choice, _)| choice.clone())),
            Action::replace().terminal(),
            Kind::Str,
            SUBCOMMAND_PRIORITY,
        );
        parameter.choices = choices;
        parameter
    }

    /// Document the parameter.
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help.text.replace(text.into());
        self
    }

    /// Override the label used in help & error messages.
    pub fn name(mut self, label: impl Into<String>) -> Self {
        self.label.replace(label.into());
        self
    }

    /// Describe the accepted syntax (ex: `[d-]hh:mm`).
    pub fn syntax(mut self, syntax: impl Into<String>) -> Self {
        self.help.syntax.replace(syntax.into());
        self
    }

    /// Add an example to the help.
    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.help.examples.push(example.into());
        self
    }

    /// Set the placeholder shown for the value(s) in help.
    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.help.metavar.replace(metavar.into());
        self
    }

    /// Set the value used when no token matches.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default.replace(value.into());
        self
    }

    /// Read back as `None` (rather than an error) when no token matches.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the conversion `token -> Value`, replacing the one derived from the declared kind.
    pub fn convert<F>(mut self, converter: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + 'static,
    {
        self.action = self.action.convert(converter);
        self
    }

    /// Add a validation run on each token before conversion.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + 'static,
    {
        self.action = self.action.validate(validator);
        self
    }

    /// Declare the value kind, used when no conversion is set.
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether the parameter keeps claiming tokens once assigned.
    pub fn duplicates(mut self, duplicates: bool) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// Narrow the tokens the parameter claims (for keywords, the values it takes) to those `matcher` accepts.
    pub fn matching(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Override the matching priority (larger is matched first).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Apply a doc metadata entry (`key` excludes the field name).
    pub(crate) fn update_meta(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "name" => {
                self.label.replace(value.to_string());
            }
            "help" => {
                self.help.text.replace(value.to_string());
            }
            "help.syntax" => {
                self.help.syntax.replace(value.to_string());
            }
            "help.examples" => {
                self.help.examples.extend(
                    value
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
            }
            _ if self.class.accepts(key) => {
                self.help.metavar.replace(value.to_string());
            }
            _ => {
                return Err(format!(
                    "'{key}' is not supported by {} parameters",
                    self.class
                ))
            }
        }

        Ok(())
    }

    /// The label used in help & error messages.
    pub(crate) fn label(&self, field: &str) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }

        match self.class {
            Class::Keyword | Class::Flag => self
                .names
                .iter()
                .find(|name| name.starts_with("--"))
                .or_else(|| self.names.first())
                .cloned()
                .unwrap_or_else(|| field.to_string()),
            _ => field.to_string(),
        }
    }

    fn child_id(field: &str) -> String {
        format!("{field}:values")
    }

    /// Materialise the parsers for `field`.
    pub(crate) fn parsers(&self, field: &str) -> Vec<Parser> {
        let action = self.action.clone().or_formatter(self.kind);

        match self.class {
            Class::Keyword => {
                let parent = Parser::new(
                    field,
                    self.priority,
                    Matcher::choice(self.names.clone()),
                    Action::replace().convert(|_| Ok(Value::Bool(true))),
                );
                let inline = self
                    .names
                    .iter()
                    .filter(|name| name.starts_with('-'))
                    .cloned();
                let child = Parser::new(
                    Parameter::child_id(field),
                    CHAIN_PRIORITY,
                    Matcher::inline(inline).or(Matcher::option_chain(
                        field,
                        self.num,
                        self.matcher.clone(),
                    )),
                    action,
                );
                vec![parent, child]
            }
            _ => vec![Parser::new(
                field,
                self.priority,
                self.matcher.clone().settings(self.duplicates, None),
                action,
            )],
        }
    }

    /// Read the value of `field` back from the final parser states.
    ///
    /// Returns the matched value, else the default, else `None` for optional parameters.
    pub(crate) fn read(&self, field: &str, parsers: &ParserMap) -> Result<Option<Value>, ParamError> {
        let label = self.label(field);
        let invalid = |error: &ValidationError| ParamError::Invalid {
            label: label.clone(),
            message: error.render(&label),
        };

        let parser = match parsers.get(field) {
            Some(parser) => parser,
            None => unreachable!("internal error - parser '{field}' must exist"),
        };

        let value = match self.class {
            Class::Keyword => {
                let child = match parsers.get(&Parameter::child_id(field)) {
                    Some(child) => child,
                    None => unreachable!("internal error - parser '{field}' must have values"),
                };

                if let Some(error) = child.validation_err() {
                    return Err(invalid(error));
                }

                if let Some(found) = self.shortfall(parser, child) {
                    let expected = self.num.unwrap_or(0);
                    let plural = if expected == 1 { "" } else { "s" };
                    return Err(invalid(&ValidationError::new(format!(
                        "expected {expected} value{plural}, found {found}."
                    ))));
                }

                match child.value() {
                    Some(value) => Some(value.clone()),
                    None if parser.is_assigned() && child.action().is_append() => {
                        Some(Value::List(Vec::default()))
                    }
                    None => None,
                }
            }
            _ => {
                if let Some(error) = parser.validation_err() {
                    return Err(invalid(error));
                }

                parser.value().cloned()
            }
        };

        match (value, &self.default) {
            (Some(value), _) => Ok(Some(value)),
            (None, Some(default)) => Ok(Some(default.clone())),
            (None, None) if self.optional => Ok(None),
            (None, None) => Err(ParamError::Mandatory {
                label,
                help: self.help.text.clone(),
            }),
        }
    }

    /// Whether a token for `field` was actually matched (as opposed to defaulted).
    pub(crate) fn is_provided(&self, field: &str, parsers: &ParserMap) -> bool {
        match self.class {
            Class::Keyword => parsers
                .get(&Parameter::child_id(field))
                .map(|child| child.value().is_some())
                .unwrap_or(false),
            _ => parsers
                .get(field)
                .map(|parser| parser.value().is_some())
                .unwrap_or(false),
        }
    }

    // The number of values found for the first under-filled chain, if any.
    fn shortfall(&self, parent: &Parser, child: &Parser) -> Option<usize> {
        let num = self.num?;
        let offsets: HashSet<usize> = child.raw_value().iter().map(|(o, _)| *o).collect();

        parent
            .raw_value()
            .iter()
            .map(|(open, _)| (open + 1..).take_while(|o| offsets.contains(o)).count())
            .find(|found| *found < num)
    }

    fn placeholder(&self, field: &str) -> String {
        self.help
            .metavar
            .clone()
            .unwrap_or_else(|| field.to_ascii_uppercase().replace('-', "_"))
    }

    fn grammar(&self, field: &str) -> String {
        let metavar = self.placeholder(field);

        match self.num {
            Some(n) => (0..n)
                .map(|_| metavar.clone())
                .collect::<Vec<String>>()
                .join(" "),
            None => format!("{metavar} ..."),
        }
    }

    fn shortest(&self) -> String {
        self.names
            .iter()
            .min_by_key(|name| name.len())
            .cloned()
            .unwrap_or_default()
    }

    fn described(&self) -> String {
        let mut help = self.help.text.clone().unwrap_or_default();

        if !self.help.examples.is_empty() {
            if !help.is_empty() {
                help.push(' ');
            }

            help.push_str(&format!("(ex: {})", self.help.examples.join(", ")));
        }

        help
    }

    fn shown_default(&self) -> Option<String> {
        match (&self.class, &self.default) {
            (Class::Flag, _) => None,
            (_, Some(default)) => Some(format!("[default: {default}]")),
            _ => None,
        }
    }

    /// Describe `field` for the help message.
    pub(crate) fn entry(&self, field: &str) -> Entry {
        let skippable = self.optional || self.default.is_some();
        let wrap = |usage: String| {
            if skippable {
                format!("[{usage}]")
            } else {
                usage
            }
        };

        let (usage, rows) = match self.class {
            Class::Positional => {
                let metavar = self.placeholder(field);
                (
                    wrap(metavar.clone()),
                    vec![Row::new(metavar, self.described(), self.shown_default())],
                )
            }
            Class::Shape => {
                let syntax = self.help.syntax.clone().unwrap_or_else(|| self.label(field));
                (
                    wrap(syntax.clone()),
                    vec![Row::new(syntax, self.described(), self.shown_default())],
                )
            }
            Class::Keyword => {
                let grammar = self.grammar(field);
                (
                    wrap(format!("{} {grammar}", self.shortest())),
                    vec![Row::new(
                        format!("{} {grammar}", self.names.join(", ")),
                        self.described(),
                        self.shown_default(),
                    )],
                )
            }
            Class::Flag => (
                format!("[{}]", self.shortest()),
                vec![Row::new(self.names.join(", "), self.described(), None)],
            ),
            Class::Subcommand => (
                wrap(format!(
                    "{{{}}}",
                    self.choices
                        .iter()
                        .map(|(choice, _)| choice.clone())
                        .collect::<Vec<String>>()
                        .join(",")
                )),
                self.choices
                    .iter()
                    .map(|(choice, description)| {
                        Row::new(choice.clone(), description.clone().unwrap_or_default(), None)
                    })
                    .collect(),
            ),
        };

        Entry::new(self.class, usage, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Engine;
    use rstest::rstest;

    fn consume(parameters: &[(&str, &Parameter)], tokens: &[&str]) -> ParserMap {
        let parsers = parameters
            .iter()
            .flat_map(|(field, parameter)| parameter.parsers(field))
            .collect();
        let args: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        Engine::new(parsers).unwrap().consume(&args).parsers
    }

    #[test]
    fn shape() {
        // Setup
        let cpu = Parameter::shape(Matcher::regex("^[0-9]+$").unwrap()).kind(Kind::Int);
        let other = Parameter::positional().optional();

        // Execute
        let parsers = consume(&[("cpu", &cpu), ("other", &other)], &["3", "4"]);

        // Verify
        assert_eq!(cpu.read("cpu", &parsers), Ok(Some(Value::Int(3))));
        assert_eq!(
            other.read("other", &parsers),
            Ok(Some(Value::Str("4".to_string())))
        );
    }

    #[rstest]
    #[case(vec![], Value::Bool(false))]
    #[case(vec!["gpu"], Value::Bool(true))]
    #[case(vec!["gpu", "gpu"], Value::Bool(true))]
    fn flag(#[case] tokens: Vec<&str>, #[case] expected: Value) {
        let gpu = Parameter::flag(["gpu"]);
        let parsers = consume(&[("gpu", &gpu)], &tokens);
        assert_eq!(gpu.read("gpu", &parsers), Ok(Some(expected)));
    }

    #[rstest]
    #[case(vec!["-a", "def"], Some("def"))]
    #[case(vec!["--account", "def"], Some("def"))]
    #[case(vec!["--account=def"], Some("def"))]
    #[case(vec!["-a", "abc", "-a", "def"], Some("def"))]
    #[case(vec![], None)]
    fn keyword(#[case] tokens: Vec<&str>, #[case] expected: Option<&str>) {
        let account = Parameter::keyword(["-a", "--account"]).optional();
        let parsers = consume(&[("account", &account)], &tokens);
        assert_eq!(
            account.read("account", &parsers),
            Ok(expected.map(Value::from))
        );
    }

    #[test]
    fn keyword_list() {
        // Setup
        let templates = Parameter::keyword_list(["-j"], Some(1));
        let rest = Parameter::positional().optional();

        // Execute
        let parsers = consume(
            &[("templates", &templates), ("rest", &rest)],
            &["-j", "Regular", "-j", "Fat", "tail"],
        );

        // Verify
        assert_eq!(
            templates.read("templates", &parsers),
            Ok(Some(Value::from(vec!["Regular", "Fat"])))
        );
        assert_eq!(
            rest.read("rest", &parsers),
            Ok(Some(Value::from("tail")))
        );
    }

    #[test]
    fn keyword_list_unbounded() {
        let items = Parameter::keyword_list(["--items"], None).default(Vec::<String>::new());
        let parsers = consume(&[("items", &items)], &["--items", "a", "b", "c"]);
        assert_eq!(
            items.read("items", &parsers),
            Ok(Some(Value::from(vec!["a", "b", "c"])))
        );

        let parsers = consume(&[("items", &items)], &["--items"]);
        assert_eq!(items.read("items", &parsers), Ok(Some(Value::List(vec![]))));
    }

    #[test]
    fn keyword_shortfall() {
        // Setup
        let pair = Parameter::keyword_list(["--pair"], Some(2)).optional();

        // Execute
        let parsers = consume(&[("pair", &pair)], &["--pair", "a"]);

        // Verify
        assert_eq!(
            pair.read("pair", &parsers),
            Err(ParamError::Invalid {
                label: "--pair".to_string(),
                message: "expected 2 values, found 1.".to_string(),
            })
        );
    }

    #[test]
    fn keyword_missing_value() {
        let account = Parameter::keyword(["-a", "--account"]).optional();
        let parsers = consume(&[("account", &account)], &["-a"]);
        assert_matches!(account.read("account", &parsers), Err(ParamError::Invalid { label, message }) => {
            assert_eq!(label, "--account");
            assert_eq!(message, "expected 1 value, found 0.");
        });
    }

    #[test]
    fn mandatory() {
        // Setup
        let uri = Parameter::positional().help("The image uri.");

        // Execute
        let parsers = consume(&[("uri", &uri)], &[]);
        let result = uri.read("uri", &parsers);

        // Verify
        assert_matches!(result, Err(error) => {
            assert_eq!(error.to_string(), "'uri' has not been provided a value (The image uri.)");
        });
    }

    #[test]
    fn default() {
        let cpu = Parameter::positional().kind(Kind::Int).default(1u32);
        let parsers = consume(&[("cpu", &cpu)], &[]);
        assert_eq!(cpu.read("cpu", &parsers), Ok(Some(Value::Int(1))));
        assert!(!cpu.is_provided("cpu", &parsers));
    }

    #[test]
    fn validation() {
        // Setup
        let template = Parameter::keyword(["-j"])
            .name("job-template")
            .validate(|token| {
                if token == "Regular" {
                    Ok(())
                } else {
                    Err(format!("'{token}' is not a template for '{{label}}'."))
                }
            });

        // Execute
        let parsers = consume(&[("template", &template)], &["-j", "Nope"]);

        // Verify
        assert_matches!(template.read("template", &parsers), Err(error) => {
            assert_eq!(
                error.to_string(),
                "Invalid value for 'job-template': 'Nope' is not a template for 'job-template'."
            );
        });
    }

    #[test]
    fn matching() {
        // Setup
        let venv = Parameter::positional()
            .matching(Matcher::regex("^[^-]").unwrap())
            .optional();

        // Execute
        let skipped = consume(&[("venv", &venv)], &["--port=9000"]);
        let claimed = consume(&[("venv", &venv)], &["--port=9000", "ml"]);

        // Verify
        assert_eq!(venv.read("venv", &skipped), Ok(None));
        assert_eq!(venv.read("venv", &claimed), Ok(Some(Value::from("ml"))));
    }

    #[test]
    fn subcommand() {
        // Setup
        let command = Parameter::subcommand([("pull", None), ("list", Some("List.".to_string()))]);

        // Execute
        let parsers = consume(&[("command", &command)], &["list", "pull"]);

        // Verify
        assert_eq!(
            command.read("command", &parsers),
            Ok(Some(Value::from("list")))
        );
        assert!(parsers["command"].is_terminal());
    }

    #[rstest]
    #[case("name", true)]
    #[case("help", true)]
    #[case("help.syntax", true)]
    #[case("help.examples", true)]
    #[case("metavar", false)]
    #[case("other", false)]
    fn update_meta_flag(#[case] key: &str, #[case] accepted: bool) {
        let mut gpu = Parameter::flag(["gpu"]);
        assert_eq!(gpu.update_meta(key, "value").is_ok(), accepted);
    }

    #[test]
    fn update_meta() {
        // Setup
        let mut account = Parameter::keyword(["-a", "--account"]);

        // Execute
        account.update_meta("metavar", "ACCOUNT").unwrap();
        account.update_meta("help", "The account.").unwrap();
        account
            .update_meta("help.examples", "def-abc\n  ctb-abc\n")
            .unwrap();

        // Verify
        let entry = account.entry("account");
        assert_eq!(entry.usage(), "-a ACCOUNT");
        assert_eq!(
            entry.rows(),
            &[Row::new(
                "-a, --account ACCOUNT".to_string(),
                "The account. (ex: def-abc, ctb-abc)".to_string(),
                None
            )]
        );
    }

    #[test]
    fn entry_usage() {
        let time = Parameter::shape(Matcher::everything())
            .syntax("[d-]hh:mm")
            .default(180i64);
        assert_eq!(time.entry("time").usage(), "[[d-]hh:mm]");
        assert_eq!(
            time.entry("time").rows()[0].default(),
            Some("[default: 180]")
        );

        let gpu = Parameter::flag(["gpu"]);
        assert_eq!(gpu.entry("gpu").usage(), "[gpu]");

        let sub = Parameter::subcommand([("pull", None), ("rm", None)]);
        assert_eq!(sub.entry("command").usage(), "{pull,rm}");
        assert_eq!(sub.entry("command").rows().len(), 2);
    }
}
