//! Logging infrastructure.
//!
//! Structured logging through the `tracing` ecosystem. Library code logs with
//! `tracing` macros; the binary installs the subscriber once at startup.
//!
//! The logging level is determined in this order:
//! 1. `--verbose` flag: DEBUG for xrserve
//! 2. `--quiet` flag: ERROR only
//! 3. `RUST_LOG` environment variable: custom filter
//! 4. Default: INFO for xrserve

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "xrserve=debug,xrserve_cli=debug";
const QUIET_FILTER: &str = "xrserve=error,xrserve_cli=error";
const DEFAULT_FILTER: &str = "xrserve=info,xrserve_cli=info";

/// Build the filter for the given verbosity flags.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize the tracing subscriber.
///
/// Must be called once, before any logging occurs.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging (overrides `quiet`)
/// * `quiet` - Only show error-level logs
/// * `no_color` - Disable colored output
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .init();
}

/// Check if colored output should be enabled.
///
/// `NO_COLOR` disables colors, `FORCE_COLOR` forces them, otherwise the
/// terminal's capabilities decide.
pub fn should_use_colors() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    console::Term::stderr().features().colors_supported()
}
