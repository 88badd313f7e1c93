//! Translation of the human friendly resource arguments into SLURM invocations.
mod args;
mod command;
mod template;

pub use args::*;
pub use command::*;
pub use template::*;
