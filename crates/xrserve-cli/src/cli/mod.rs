//! Command-line interface definition for xrserve.
//!
//! # Command Structure
//!
//! - `xrserve serve` - Serve one or more visualizations with live reload
//! - `xrserve status` - Show the managed port range

mod commands;

use clap::Parser;
use std::path::PathBuf;

pub use commands::{Command, ServeArgs, StatusArgs};

/// xrserve - local HTTP/HTTPS server for XR and chart visualizations
#[derive(Parser, Debug)]
#[command(
    name = "xrserve",
    version,
    about = "Serve local visualizations with live reload",
    long_about = "xrserve serves generated HTML/XR visualizations on local ports with\n\
                  automatic port allocation, optional HTTPS, and Server-Sent Events\n\
                  live reload when the page or its data files change."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to a config file (defaults to ./xrserve.config.json if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
