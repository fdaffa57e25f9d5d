use tracing_subscriber::EnvFilter;

/// Filter used by the CLI. Fixed so that no environment variable is consulted.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Install a stderr subscriber so stdout carries only the report line.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(directive: &str) {
    let filter =
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
