//! Command implementations for the xrserve CLI.
//!
//! - [`serve`] - Start visualization servers and run until Ctrl+C
//! - [`status`] - Report the managed port range

pub mod serve;
pub mod status;

pub use serve::execute as serve_execute;
pub use status::execute as status_execute;
