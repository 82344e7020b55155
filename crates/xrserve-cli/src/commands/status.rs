//! `xrserve status`: report the managed port range.

use crate::cli::StatusArgs;
use crate::config::{ConfigOverrides, ServeConfig};
use crate::error::Result;
use crate::ports::{PortAllocator, PortStatus};
use crate::ui;
use std::path::Path;

/// Execute the status command.
///
/// Reservations are per-process, so a fresh process reports only what the
/// OS says about each port in the range.
pub async fn execute(args: StatusArgs, config_path: Option<&Path>) -> Result<()> {
    let config = ServeConfig::load(&ConfigOverrides::default(), config_path)?;
    let allocator = PortAllocator::new(config.allocator_config(), config.host.clone());
    let status = allocator.port_status().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    Ok(())
}

fn print_status(status: &PortStatus) {
    ui::info(&format!(
        "Port range {}-{}: {} of {} ports free",
        status.range.start,
        status.range.end,
        status.available.len(),
        status.total
    ));

    for reservation in &status.managed {
        ui::info(&format!(
            "  {} - {} ({})",
            reservation.port, reservation.service, reservation.description
        ));
    }

    let busy = status
        .total
        .saturating_sub(status.available.len() + status.managed.len());
    if busy > 0 {
        ui::warning(&format!("{} port(s) in the range are in use by other processes", busy));
    }
}
