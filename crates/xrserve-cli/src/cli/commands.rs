use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::server::ServerMode;

/// Available xrserve subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve visualizations with live reload
    ///
    /// Starts one server per path. A directory serves its index.html; a file
    /// is served directly. Runs until interrupted with Ctrl+C.
    Serve(ServeArgs),

    /// Show reserved and free ports in the managed range
    Status(StatusArgs),
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directories or HTML files to serve
    ///
    /// Examples:
    ///   xrserve serve out/visualizations/app
    ///   xrserve serve out/a/index.html out/b/chart.html
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Protocol and certificate source
    #[arg(short, long, value_enum, default_value = "http")]
    pub mode: ServerMode,

    /// Preferred port (used if free and inside the managed range)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Private key for https-custom-certs
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Certificate for https-custom-certs
    #[arg(long, value_name = "PATH")]
    pub cert: Option<PathBuf>,

    /// Interface to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Open each server in the default browser
    #[arg(long)]
    pub open: bool,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}
