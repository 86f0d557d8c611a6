//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Verbosity comes from the `TPIO_LOG` environment variable, in
//! `EnvFilter` syntax (e.g. `debug` or `tpio::muxer=trace`), and defaults to
//! `warn`.  Events go to stderr; stdout belongs to the test program's
//! results.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TPIO_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber.
///
/// Calling it again is harmless: the first subscriber stays in place.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
