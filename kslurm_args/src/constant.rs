pub(crate) const HELP_ID: &str = "help";
pub(crate) const HELP_NAME: &str = "help";
pub(crate) const HELP_SHORT: char = 'h';
pub(crate) const HELP_MESSAGE: &str = "Show this help message and exit.";
pub(crate) const HELP_UNAVAILABLE: &str = "HELP UNAVAILABLE";

pub(crate) const TERMINATOR_ID: &str = "--";
pub(crate) const TERMINATOR: &str = "--";

// Larger is matched first.
pub(crate) const HELP_PRIORITY: i32 = 100;
pub(crate) const TERMINATOR_PRIORITY: i32 = 90;
pub(crate) const CHAIN_PRIORITY: i32 = 50;
pub(crate) const KEYWORD_PRIORITY: i32 = 40;
pub(crate) const FLAG_PRIORITY: i32 = 40;
pub(crate) const SHAPE_PRIORITY: i32 = 30;
pub(crate) const SUBCOMMAND_PRIORITY: i32 = 20;
pub(crate) const POSITIONAL_PRIORITY: i32 = 0;

pub(crate) const SUBCOMMAND_ID: &str = "command";
pub(crate) const TAIL_METAVAR: &str = "COMMAND";
