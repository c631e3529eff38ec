//! Diagnostic logging on stderr.
//!
//! `RUST_LOG` wins when set; otherwise the level comes from the number of
//! `-v` flags.

use tracing_subscriber::EnvFilter;

pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Calling it twice is harmless: the second
/// installation is ignored.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("convparity={}", level_for_verbosity(verbose))));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
