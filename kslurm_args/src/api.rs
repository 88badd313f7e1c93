mod action;
mod core;
mod field;
mod parameter;

pub use self::core::*;
pub(crate) use action::ActionError;
pub use action::{Action, Signal, ValidationError};
pub use field::*;
pub use parameter::ParamError;
pub use parameter::Parameter;
