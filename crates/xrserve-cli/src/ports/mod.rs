//! Port allocation for visualization servers.
//!
//! Hands out ports from a fixed range, honoring a preference list, and keeps
//! two pieces of bookkeeping:
//!
//! - **Reservations**: which ports this process currently owns, by whom.
//! - **Protocol history**: the protocol each port was last reserved for. It
//!   outlives the reservation so a port that served HTTPS never silently
//!   switches to HTTP (or the reverse) during the same process lifetime.
//!
//! Only [`PortProbe::is_port_available`] touches the OS; everything else is
//! in-memory.

mod probe;

pub use probe::{PortProbe, SystemProbe};

use crate::error::PortError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Wire protocol a port is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// URL scheme for this protocol.
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("HTTP"),
            Protocol::Https => f.write_str("HTTPS"),
        }
    }
}

/// A port currently owned by a running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortReservation {
    pub port: u16,
    pub service: String,
    pub description: String,
    pub protocol: Protocol,
    pub reserved_at: DateTime<Utc>,
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        usize::from(self.end.saturating_sub(self.start)) + 1
    }

    /// Only an inverted range is empty; `start == end` holds one port.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Snapshot of the managed range.
#[derive(Debug, Clone, Serialize)]
pub struct PortStatus {
    /// Reservations, sorted ascending by port
    pub managed: Vec<PortReservation>,
    /// Unmanaged ports the OS currently reports as free
    pub available: Vec<u16>,
    /// Size of the range
    pub total: usize,
    pub range: PortRange,
}

/// Allocator settings.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub range: PortRange,
    /// Tried in order before the sequential scan
    pub preferred_ports: Vec<u16>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            range: PortRange {
                start: 3000,
                end: 3100,
            },
            preferred_ports: vec![3000, 8080, 8000, 3001, 3002],
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    reservations: HashMap<u16, PortReservation>,
    history: HashMap<u16, Protocol>,
}

/// Tracks port ownership and finds free, protocol-compatible ports.
///
/// The ledger lock is only held for in-memory checks; system probes run
/// without it.
pub struct PortAllocator {
    config: AllocatorConfig,
    probe: Arc<dyn PortProbe>,
    ledger: Mutex<Ledger>,
}

impl PortAllocator {
    /// Create an allocator that probes the OS on `host`.
    pub fn new(config: AllocatorConfig, host: impl Into<String>) -> Self {
        Self::with_probe(config, Arc::new(SystemProbe::new(host)))
    }

    /// Create an allocator with a custom availability probe.
    pub fn with_probe(config: AllocatorConfig, probe: Arc<dyn PortProbe>) -> Self {
        Self {
            config,
            probe,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn range(&self) -> PortRange {
        self.config.range
    }

    /// Probe the OS for `port`.
    pub async fn is_port_available(&self, port: u16) -> bool {
        self.probe.is_port_available(port).await
    }

    /// Find the first usable port for `protocol`.
    ///
    /// Resolution order: `preferred_port` (if in range), the configured
    /// preference list, then an ascending scan of the range skipping ports
    /// already tried. A port is usable when it is not reserved here, the OS
    /// reports it free, and its protocol history is unset or matches.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Exhausted`] when nothing in the range matches.
    pub async fn find_free_port(
        &self,
        preferred_port: Option<u16>,
        protocol: Protocol,
    ) -> Result<u16, PortError> {
        let range = self.config.range;
        debug!(
            %protocol,
            start = range.start,
            end = range.end,
            managed = ?self.managed_ports(),
            "finding free port"
        );

        let preferred_port = preferred_port.filter(|p| range.contains(*p));
        if let Some(port) = preferred_port {
            if self.is_port_usable(port, protocol).await {
                debug!(port, "preferred port is available and compatible");
                return Ok(port);
            }
        }

        for &port in &self.config.preferred_ports {
            if !range.contains(port) || Some(port) == preferred_port {
                continue;
            }
            if self.is_port_usable(port, protocol).await {
                debug!(port, "preference-list port is available and compatible");
                return Ok(port);
            }
        }

        for port in range.start..=range.end {
            if self.config.preferred_ports.contains(&port) || Some(port) == preferred_port {
                continue;
            }
            if self.is_port_usable(port, protocol).await {
                debug!(port, "found free and compatible port");
                return Ok(port);
            }
        }

        Err(PortError::Exhausted {
            start: range.start,
            end: range.end,
            protocol,
        })
    }

    async fn is_port_usable(&self, port: u16, protocol: Protocol) -> bool {
        if self.is_port_managed(port) {
            debug!(port, "port is managed");
            return false;
        }

        if !self.probe.is_port_available(port).await {
            debug!(port, "port is in use by the system");
            return false;
        }

        // The probe is async; re-read history after it.
        match self.ledger.lock().history.get(&port) {
            Some(previous) if *previous != protocol => {
                debug!(port, was = %previous, need = %protocol, "protocol conflict");
                false
            }
            _ => true,
        }
    }

    /// Record a reservation and update the port's protocol history.
    pub fn reserve_port(&self, port: u16, service: &str, description: &str, protocol: Protocol) {
        let mut ledger = self.ledger.lock();
        Self::insert(&mut ledger, port, service, description, protocol);
    }

    /// Reserve `port` only if nobody holds it yet.
    ///
    /// Returns `false` when another caller reserved it first.
    pub fn try_reserve_port(
        &self,
        port: u16,
        service: &str,
        description: &str,
        protocol: Protocol,
    ) -> bool {
        let mut ledger = self.ledger.lock();
        if ledger.reservations.contains_key(&port) {
            return false;
        }
        Self::insert(&mut ledger, port, service, description, protocol);
        true
    }

    fn insert(ledger: &mut Ledger, port: u16, service: &str, description: &str, protocol: Protocol) {
        let reservation = PortReservation {
            port,
            service: service.to_string(),
            description: format!("{} ({})", description, protocol),
            protocol,
            reserved_at: Utc::now(),
        };
        ledger.reservations.insert(port, reservation);
        ledger.history.insert(port, protocol);
        info!(port, service, %protocol, description, "reserved port");
    }

    /// Drop the reservation for `port`. Protocol history is kept.
    pub fn release_port(&self, port: u16) {
        if let Some(reservation) = self.ledger.lock().reservations.remove(&port) {
            info!(port, service = %reservation.service, "released port");
        }
    }

    /// Drop every reservation.
    pub fn release_all_ports(&self) {
        let mut ledger = self.ledger.lock();
        let count = ledger.reservations.len();
        ledger.reservations.clear();
        info!(count, "released all managed ports");
    }

    /// Whether `port` is currently reserved by this allocator.
    pub fn is_port_managed(&self, port: u16) -> bool {
        self.ledger.lock().reservations.contains_key(&port)
    }

    /// Protocol `port` was last reserved for, if ever.
    pub fn last_protocol(&self, port: u16) -> Option<Protocol> {
        self.ledger.lock().history.get(&port).copied()
    }

    /// All reservations, sorted ascending by port.
    pub fn active_ports(&self) -> Vec<PortReservation> {
        let mut ports: Vec<_> = self.ledger.lock().reservations.values().cloned().collect();
        ports.sort_by_key(|r| r.port);
        ports
    }

    fn managed_ports(&self) -> Vec<u16> {
        let mut ports: Vec<_> = self.ledger.lock().reservations.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Reservations plus a system probe of every unmanaged port in range.
    pub async fn port_status(&self) -> PortStatus {
        let range = self.config.range;
        let managed = self.active_ports();
        let mut available = Vec::new();

        for port in range.start..=range.end {
            if !self.is_port_managed(port) && self.probe.is_port_available(port).await {
                available.push(port);
            }
        }

        PortStatus {
            managed,
            available,
            total: range.len(),
            range,
        }
    }
}
