//! Process-wide serving state.
//!
//! Everything the lifecycle manager shares between servers lives here and is
//! built once at startup. Tests build their own isolated contexts.

use crate::config::ServeConfig;
use crate::livereload::LiveReloadHub;
use crate::ports::{PortAllocator, PortProbe};
use crate::server::{CertificateProvider, FileCertificateProvider, SessionHook, SessionRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct ServeContext {
    pub config: Arc<ServeConfig>,
    pub ports: Arc<PortAllocator>,
    /// Shared by every server: a broadcast reaches all open pages
    pub hub: Arc<LiveReloadHub>,
    pub certs: Arc<dyn CertificateProvider>,
    pub sessions: Arc<dyn SessionHook>,
}

impl ServeContext {
    /// Context with the default collaborators: OS port probing,
    /// certificates from disk and an in-memory session registry.
    pub fn new(config: ServeConfig) -> Self {
        let ports = PortAllocator::new(config.allocator_config(), config.host.clone());
        let certs = FileCertificateProvider::from_config(&config);

        Self {
            config: Arc::new(config),
            ports: Arc::new(ports),
            hub: Arc::new(LiveReloadHub::new()),
            certs: Arc::new(certs),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Replace the OS port probe.
    pub fn with_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.ports = Arc::new(PortAllocator::with_probe(
            self.config.allocator_config(),
            probe,
        ));
        self
    }

    pub fn with_certificates(mut self, certs: Arc<dyn CertificateProvider>) -> Self {
        self.certs = certs;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionHook>) -> Self {
        self.sessions = sessions;
        self
    }
}
