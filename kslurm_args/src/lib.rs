//! Priority-ordered argument matching and command dispatch.
//!
//! A command is a sequence of `(field, Parameter)` pairs.
//! Each [`Parameter`] materialises one or more [`Parser`]s, each holding a [`Matcher`] and an [`Action`].
//! The [`Engine`] feeds each token to the highest priority parser whose matcher claims it, and sends the
//! remainder to the command's tail.
//! A [`Command`] wraps the engine with help, error reporting, and subcommand dispatch.
#![warn(missing_docs)]
mod api;
mod constant;
mod doc;
mod matcher;
mod model;
mod parser;
pub mod prelude;

pub use api::*;
pub use doc::DocError;
pub use matcher::*;
pub use model::*;
pub use parser::*;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
