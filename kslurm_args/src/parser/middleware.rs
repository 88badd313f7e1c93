use std::collections::{HashMap, HashSet};

use crate::api::{Command, Invocation, ParamError, Signal, Values};
use crate::constant::*;
use crate::model::Value;
use crate::parser::interface::UserInterface;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// Run `command` against `argv`, returning the exit code.
///
/// The order of precedence is:
/// 1. A help request prints the full help on standard output, and exits `0`.
/// 2. Read-back & unexpected argument errors print the usage and each error on standard error, and exit `1`.
/// 3. A selected subcommand is run against the tail, under the entry name `"<entry> <subcommand>"`.
/// 4. Otherwise the command body runs.
pub(crate) fn run(command: &Command, argv: Vec<String>, user_interface: &dyn UserInterface) -> i32 {
    let mut argv = argv.into_iter();
    let entry = argv.next().unwrap_or_else(|| command.name().to_string());
    let args: Vec<String> = argv.collect();

    if let Some(error) = command.deferred_error() {
        user_interface.print_error(error.to_string());
        return 1;
    }

    let engine = match command.engine() {
        Ok(engine) => engine,
        Err(error) => {
            user_interface.print_error(error.to_string());
            return 1;
        }
    };
    let printer = command.printer(&entry);
    let consumed = engine.consume(&args);

    if consumed.signal == Some(Signal::HelpRequest) {
        match printer.help(user_interface.is_styled()) {
            Ok(help) => user_interface.print(help),
            Err(_error) => {
                #[cfg(feature = "tracing_debug")]
                {
                    debug!("Help rendering failed: {_error}.");
                }

                user_interface.print_error(HELP_UNAVAILABLE.to_string())
            }
        }

        return 0;
    }

    let mut errors: Vec<String> = Vec::default();
    let mut values: HashMap<String, Option<Value>> = HashMap::default();
    let mut provided: HashSet<String> = HashSet::default();

    for (field, parameter) in command.parameters() {
        match parameter.read(&field, &consumed.parsers) {
            Ok(value) => {
                if parameter.is_provided(&field, &consumed.parsers) {
                    provided.insert(field.clone());
                }

                values.insert(field, value);
            }
            Err(error) => errors.push(error.to_string()),
        }
    }

    errors.extend(consumed.errors.iter().map(ToString::to_string));
    let tail = consumed.tail_tokens();
    let selected = match values.get(SUBCOMMAND_ID) {
        Some(Some(Value::Str(choice))) => Some(choice.clone()),
        _ => None,
    };

    if let Some(message) = command.requires_tail() {
        if selected.is_none() && tail.is_empty() {
            errors.push(ParamError::MissingTail(message.to_string()).to_string());
        }
    }

    if !errors.is_empty() {
        user_interface.print_error(printer.usage());

        for error in errors {
            user_interface.print_error(error);
        }

        return 1;
    }

    if let Some(choice) = selected {
        let subcommand = match command.find(&choice) {
            Some(subcommand) => subcommand,
            None => unreachable!("internal error - subcommand '{choice}' must exist"),
        };

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Dispatching '{entry}' to '{choice}' with {tail:?}.");
        }

        let mut sub_argv = vec![format!("{entry} {choice}")];
        sub_argv.extend(tail);
        return run(subcommand, sub_argv, user_interface);
    }

    let help = printer
        .help(false)
        .unwrap_or_else(|_| HELP_UNAVAILABLE.to_string());
    let invocation = Invocation::new(entry, tail, consumed.parsers, help);

    match command.body() {
        Some(body) => match body(&mut Values::new(values, provided), &invocation) {
            Ok(code) => code,
            Err(error) => {
                user_interface.print_error(error.to_string());
                1
            }
        },
        None => 0,
    }
}
