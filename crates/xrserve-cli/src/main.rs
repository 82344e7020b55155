//! xrserve CLI entry point.
//!
//! Parses arguments, initializes logging and colors, and dispatches to the
//! command implementations.

use clap::Parser;
use miette::Result;
use xrserve_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let config_path = args.config.as_deref();
    let result = match args.command {
        cli::Command::Serve(serve_args) => commands::serve_execute(serve_args, config_path).await,
        cli::Command::Status(status_args) => {
            commands::status_execute(status_args, config_path).await
        }
    };

    result.map_err(error::serve_error_to_miette)
}
