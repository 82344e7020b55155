//! `xrserve serve`: start servers and run until interrupted.

use crate::cli::ServeArgs;
use crate::config::{ConfigOverrides, ServeConfig};
use crate::context::ServeContext;
use crate::error::{PortError, Result, ResultExt, ServeError};
use crate::ports::PortRange;
use crate::server::ServerManager;
use crate::ui;
use std::path::Path;
use tokio::signal;
use tracing::debug;

/// Execute the serve command.
///
/// Starts one server per path. Paths that fail are reported and skipped;
/// the command fails only when no server could be started.
pub async fn execute(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let overrides = ConfigOverrides {
        host: args.host.clone(),
        custom_key: args.key.clone(),
        custom_cert: args.cert.clone(),
    };
    let config = ServeConfig::load(&overrides, config_path)?;
    debug!(?config, "loaded configuration");
    if let Some(port) = args.port {
        check_port(port, config.port_range())?;
    }

    let manager = ServerManager::new(ServeContext::new(config));
    let mut started = Vec::new();
    let mut failures = Vec::new();

    for path in &args.paths {
        match manager.create_server(path, args.mode, args.port).await {
            Ok(Some(info)) => {
                ui::success(&format!(
                    "{} server running at {} ({})",
                    info.protocol, info.display_url, info.url
                ));
                if args.open {
                    open_browser(&info.url);
                }
                started.push(info);
            }
            // Bind conflicts are reported by the manager.
            Ok(None) => {}
            Err(e) => failures.push((path.clone(), e)),
        }
    }

    if started.is_empty() {
        return Err(failures
            .into_iter()
            .next()
            .map(|(_, e)| e)
            .unwrap_or_else(|| ServeError::Server("Failed to create server".to_string())));
    }
    for (path, e) in &failures {
        ui::warning(&format!("Skipped {}: {}", path.display(), e));
    }

    ui::info("Press Ctrl+C to stop");
    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    ui::info("Shutting down...");
    manager.stop_all_servers();
    ui::success(&format!("Stopped {} server(s)", started.len()));

    Ok(())
}

/// An explicit `--port` must lie in the managed range.
fn check_port(port: u16, range: PortRange) -> std::result::Result<(), PortError> {
    if range.contains(port) {
        Ok(())
    } else {
        Err(PortError::OutOfRange {
            port,
            start: range.start,
            end: range.end,
        })
    }
}

/// Open the URL in the default browser.
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}
