use tracing_subscriber::EnvFilter;

/// The variable holding the log filter (ex: `KSLURM_LOG=debug`).
pub const LOG_VARIABLE: &str = "KSLURM_LOG";

/// Send `tracing` events to standard error, filtered by `KSLURM_LOG` (default: `warn`).
///
/// Standard output is left to the commands themselves.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_VARIABLE).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed (ex: under test).
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
