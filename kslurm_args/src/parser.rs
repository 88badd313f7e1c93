mod base;
mod interface;
pub(crate) mod middleware;
mod printer;

pub use base::*;
#[cfg(any(test, feature = "unit_test"))]
pub use interface::InMemoryInterface;
pub use interface::{ConsoleInterface, UserInterface};
pub(crate) use printer::{Class, Entry, Printer, Row};
