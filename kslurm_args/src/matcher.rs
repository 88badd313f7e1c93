mod core;
mod model;

pub use self::core::*;
pub use model::*;
