//! Terminal status messages.
//!
//! User-facing notifications (server started, port conflicts, shutdown) are
//! printed here; diagnostic output goes through `tracing` instead.

mod messages;

use std::sync::atomic::{AtomicBool, Ordering};

pub use messages::{error, info, success, warning};

static COLORS: AtomicBool = AtomicBool::new(true);

/// Initialize color support for terminal output.
///
/// Respects `--no-color`, `NO_COLOR` / `FORCE_COLOR` and terminal capabilities.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && crate::logger::should_use_colors();
    COLORS.store(enabled, Ordering::Relaxed);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}
