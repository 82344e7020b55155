//! Server registry and lifecycle.
//!
//! [`ServerManager`] ties the port allocator, request handler, listener and
//! watchers together into running visualization servers, and keeps the
//! registry of what is running.
//!
//! Ordering within one `create_server` call: port reservation, then the bind,
//! then registration, then watchers. Concurrent calls may pick the same port;
//! the loser fails to reserve or bind and resolves to `Ok(None)`.

mod certs;
mod listener;
mod sessions;
mod watch;

pub use certs::{tls_acceptor, CertificatePair, CertificateProvider, FileCertificateProvider};
pub use listener::{Listener, ListenerState};
pub use sessions::{AnalysisSession, AnalysisType, SessionHook, SessionRegistry, DIRECTORY_PREFIX};
pub use watch::{is_data_change, ServerWatchers};

use crate::context::ServeContext;
use crate::error::{Result, ResultExt};
use crate::handler::RequestHandler;
use crate::ports::{PortStatus, Protocol};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Service name recorded on port reservations.
const SERVICE_NAME: &str = "HTTP/HTTPS Server";

/// How a server speaks to browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum ServerMode {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS_DEFAULT_CERTS")]
    HttpsDefaultCerts,
    #[serde(rename = "HTTPS_CUSTOM_CERTS")]
    HttpsCustomCerts,
}

impl ServerMode {
    pub fn protocol(&self) -> Protocol {
        match self {
            ServerMode::Http => Protocol::Http,
            ServerMode::HttpsDefaultCerts | ServerMode::HttpsCustomCerts => Protocol::Https,
        }
    }

    pub fn uses_https(&self) -> bool {
        self.protocol() == Protocol::Https
    }

    /// Human-readable description.
    pub fn label(&self) -> &'static str {
        match self {
            ServerMode::Http => "HTTP",
            ServerMode::HttpsDefaultCerts => "HTTPS (default certificates)",
            ServerMode::HttpsCustomCerts => "HTTPS (custom certificates)",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Http => f.write_str("HTTP"),
            ServerMode::HttpsDefaultCerts => f.write_str("HTTPS_DEFAULT_CERTS"),
            ServerMode::HttpsCustomCerts => f.write_str("HTTPS_CUSTOM_CERTS"),
        }
    }
}

/// A running server as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstance {
    /// `server-<unix millis>`, suffixed on same-millisecond collisions
    pub id: String,
    /// Full URL on localhost
    pub url: String,
    /// URL with the entry file stem in place of the host
    pub display_url: String,
    pub protocol: Protocol,
    pub port: u16,
    /// Entry file being served
    pub file_path: PathBuf,
    pub use_https: bool,
    pub mode: ServerMode,
    pub started_at: DateTime<Utc>,
    /// Name of the analysis shown, `DIR:<name>` for directory analyses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_file_name: Option<String>,
}

impl ServerInstance {
    fn new(id: String, port: u16, mode: ServerMode, file_path: PathBuf) -> Self {
        let protocol = mode.protocol();
        let stem = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());

        Self {
            id,
            url: format!("{}://localhost:{}", protocol.scheme(), port),
            display_url: format!("{}://{}:{}", protocol.scheme(), stem, port),
            protocol,
            port,
            file_path,
            use_https: mode.uses_https(),
            mode,
            started_at: Utc::now(),
            analysis_file_name: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: &str, port: u16, mode: ServerMode, file_path: PathBuf) -> Self {
        Self::new(id.to_string(), port, mode, file_path)
    }

    #[cfg(test)]
    pub(crate) fn with_analysis_file_name(mut self, name: Option<&str>) -> Self {
        self.analysis_file_name = name.map(str::to_string);
        self
    }
}

/// Partial update merged onto a registered instance.
#[derive(Debug, Clone, Default)]
pub struct ServerInfoUpdate {
    pub url: Option<String>,
    pub display_url: Option<String>,
    pub file_path: Option<PathBuf>,
    pub analysis_file_name: Option<String>,
}

impl ServerInfoUpdate {
    fn apply(self, info: &mut ServerInstance) {
        if let Some(url) = self.url {
            info.url = url;
        }
        if let Some(display_url) = self.display_url {
            info.display_url = display_url;
        }
        if let Some(file_path) = self.file_path {
            info.file_path = file_path;
        }
        if let Some(name) = self.analysis_file_name {
            info.analysis_file_name = Some(name);
        }
    }
}

struct ServerEntry {
    info: ServerInstance,
    listener: Arc<Listener>,
    watchers: ServerWatchers,
}

#[derive(Default)]
struct Registry {
    entries: Vec<ServerEntry>,
    active: Option<String>,
}

impl Registry {
    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.info.id == id)
    }

    /// Remove `id`; if it was active, the most recent remaining entry
    /// becomes active.
    fn remove(&mut self, id: &str) -> Option<ServerEntry> {
        let index = self.position(id)?;
        let entry = self.entries.remove(index);
        if self.active.as_deref() == Some(id) {
            self.active = self.entries.last().map(|e| e.info.id.clone());
        }
        Some(entry)
    }
}

#[derive(Default)]
struct IdClock {
    last_millis: i64,
    seq: u32,
}

impl IdClock {
    /// A clock that repeats or steps backwards keeps suffixing the last
    /// millisecond seen, so ids are never reissued.
    fn next(&mut self, now_millis: i64) -> String {
        if now_millis <= self.last_millis {
            self.seq += 1;
            format!("server-{}-{}", self.last_millis, self.seq)
        } else {
            self.last_millis = now_millis;
            self.seq = 0;
            format!("server-{}", now_millis)
        }
    }
}

struct Inner {
    ctx: ServeContext,
    registry: Mutex<Registry>,
    ids: Mutex<IdClock>,
}

/// Creates, tracks and stops visualization servers.
#[derive(Clone)]
pub struct ServerManager {
    inner: Arc<Inner>,
}

impl ServerManager {
    pub fn new(ctx: ServeContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                registry: Mutex::new(Registry::default()),
                ids: Mutex::new(IdClock::default()),
            }),
        }
    }

    pub fn context(&self) -> &ServeContext {
        &self.inner.ctx
    }

    /// Start a server for `root_path`.
    ///
    /// A directory serves its `index.html`; a file is served directly. The
    /// handler root is the entry file's directory.
    ///
    /// # Errors
    ///
    /// - [`ServeError::FileNotFound`](crate::error::ServeError::FileNotFound) if `root_path` does not exist
    /// - [`ServeError::Port`](crate::error::ServeError::Port) if no compatible port is left in the range
    /// - [`ServeError::Certificate`](crate::error::ServeError::Certificate) if HTTPS material cannot be loaded
    ///
    /// A bind conflict is not an error: the port is released and `Ok(None)`
    /// is returned.
    pub async fn create_server(
        &self,
        root_path: &Path,
        mode: ServerMode,
        preferred_port: Option<u16>,
    ) -> Result<Option<ServerInstance>> {
        let ctx = &self.inner.ctx;
        let protocol = mode.protocol();

        // Relative paths like `.` or `index.html` have no usable parent.
        let root_path = tokio::fs::canonicalize(root_path)
            .await
            .with_path(root_path)?;
        let meta = tokio::fs::metadata(&root_path).await.with_path(&root_path)?;
        let entry = if meta.is_dir() {
            root_path.join("index.html")
        } else {
            root_path.clone()
        };
        let serve_dir = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let port = ctx.ports.find_free_port(preferred_port, protocol).await?;
        debug!(port, %mode, entry = %entry.display(), "creating server");

        let router = RequestHandler::new(&serve_dir, &entry, ctx.hub.clone()).into_router();

        let tls = if mode.uses_https() {
            let use_default_certs = mode == ServerMode::HttpsDefaultCerts;
            let pair = ctx.certs.certificates(use_default_certs).await?;
            Some(tls_acceptor(&pair)?)
        } else {
            None
        };

        let entry_name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let description = format!("Serving {}", entry_name);
        if !ctx
            .ports
            .try_reserve_port(port, SERVICE_NAME, &description, protocol)
        {
            warn!(port, "port was reserved by a concurrent server");
            crate::ui::error(&format!(
                "Port {} is already in use. The port allocator will try a different port on next attempt.",
                port
            ));
            return Ok(None);
        }

        let id = self.inner.ids.lock().next(Utc::now().timestamp_millis());
        let listener = Arc::new(Listener::new());
        let on_fatal = self.eviction_hook(id.clone());

        let bound = listener
            .listen((ctx.config.host.as_str(), port), router, tls, on_fatal)
            .await;
        if let Err(e) = bound {
            ctx.ports.release_port(port);
            warn!(port, error = %e, "server failed to start");
            if e.kind() == io::ErrorKind::AddrInUse {
                crate::ui::error(&format!(
                    "Port {} is already in use. The port allocator will try a different port on next attempt.",
                    port
                ));
            } else {
                crate::ui::error(&format!("Server error on port {}: {}", port, e));
            }
            return Ok(None);
        }

        let info = ServerInstance::new(id.clone(), port, mode, entry.clone());
        {
            let mut registry = self.inner.registry.lock();
            registry.entries.push(ServerEntry {
                info: info.clone(),
                listener,
                watchers: ServerWatchers::default(),
            });
            registry.active = Some(id.clone());
        }

        let watchers = ServerWatchers::attach(
            &entry,
            &serve_dir,
            &ctx.hub,
            Duration::from_millis(ctx.config.watch_settle_ms),
        );
        {
            let mut registry = self.inner.registry.lock();
            match registry.position(&id) {
                Some(index) => registry.entries[index].watchers = watchers,
                None => debug!(server_id = %id, "server stopped before watchers were attached"),
            }
        }

        info!(server_id = %id, port, %protocol, url = %info.url, "server started");
        Ok(Some(info))
    }

    /// Hook run by a listener whose accept loop died: evict its entry.
    fn eviction_hook(&self, id: String) -> listener::FatalHook {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                warn!(server_id = %id, "evicting server after listener failure");
                ServerManager { inner }.stop_server(Some(&id));
            }
        })
    }

    /// Stop a server by id, or the active one when `id` is `None`.
    ///
    /// Closes the listener, removes bound analysis sessions, unregisters the
    /// server and releases its port. Returns `false` for an unknown id.
    pub fn stop_server(&self, id: Option<&str>) -> bool {
        let entry = {
            let mut registry = self.inner.registry.lock();
            let target = match id {
                Some(id) => Some(id.to_string()),
                None => registry.active.clone(),
            };
            target.and_then(|target| registry.remove(&target))
        };

        let Some(entry) = entry else {
            match id {
                Some(id) => warn!(server_id = id, "server not found for stopping"),
                None => debug!("no active server to stop"),
            }
            return false;
        };

        let ctx = &self.inner.ctx;
        entry.listener.stop();
        ctx.sessions.remove_sessions_for(&entry.info);
        ctx.ports.release_port(entry.info.port);
        drop(entry.watchers);

        info!(server_id = %entry.info.id, port = entry.info.port, "server stopped");
        true
    }

    /// Stop every registered server.
    pub fn stop_all_servers(&self) {
        let ids: Vec<String> = self
            .inner
            .registry
            .lock()
            .entries
            .iter()
            .map(|e| e.info.id.clone())
            .collect();

        for id in &ids {
            self.stop_server(Some(id));
        }

        let mut registry = self.inner.registry.lock();
        registry.entries.clear();
        registry.active = None;
        debug!(count = ids.len(), "stopped all servers");
    }

    /// Registered servers, oldest first.
    pub fn active_servers(&self) -> Vec<ServerInstance> {
        self.inner
            .registry
            .lock()
            .entries
            .iter()
            .map(|e| e.info.clone())
            .collect()
    }

    /// The most recently active server.
    pub fn active_server(&self) -> Option<ServerInstance> {
        let registry = self.inner.registry.lock();
        let id = registry.active.as_deref()?;
        registry
            .entries
            .iter()
            .find(|e| e.info.id == id)
            .map(|e| e.info.clone())
    }

    pub fn server(&self, id: &str) -> Option<ServerInstance> {
        let registry = self.inner.registry.lock();
        registry
            .position(id)
            .map(|index| registry.entries[index].info.clone())
    }

    /// Listener state for a registered server.
    pub fn listener_state(&self, id: &str) -> Option<ListenerState> {
        let registry = self.inner.registry.lock();
        registry
            .position(id)
            .map(|index| registry.entries[index].listener.state())
    }

    /// Port status for the managed range.
    pub async fn server_port_status(&self) -> PortStatus {
        self.inner.ctx.ports.port_status().await
    }

    /// Merge `update` onto a registered server. Returns `false` for an
    /// unknown id.
    pub fn update_server_display_info(&self, id: &str, update: ServerInfoUpdate) -> bool {
        let mut registry = self.inner.registry.lock();
        match registry.position(id) {
            Some(index) => {
                update.apply(&mut registry.entries[index].info);
                debug!(server_id = id, "updated server info");
                true
            }
            None => {
                warn!(server_id = id, "server not found for update");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_protocol_and_display() {
        assert_eq!(ServerMode::Http.protocol(), Protocol::Http);
        assert_eq!(ServerMode::HttpsCustomCerts.protocol(), Protocol::Https);
        assert_eq!(ServerMode::HttpsDefaultCerts.to_string(), "HTTPS_DEFAULT_CERTS");
        assert_eq!(ServerMode::HttpsDefaultCerts.label(), "HTTPS (default certificates)");
    }

    #[test]
    fn test_mode_value_names() {
        use clap::ValueEnum;
        assert_eq!(
            ServerMode::from_str("https-default-certs", true).unwrap(),
            ServerMode::HttpsDefaultCerts
        );
        assert_eq!(ServerMode::from_str("http", true).unwrap(), ServerMode::Http);
    }

    #[test]
    fn test_instance_urls() {
        let info = ServerInstance::for_tests(
            "server-1",
            3001,
            ServerMode::HttpsDefaultCerts,
            PathBuf::from("/out/viz/chart.html"),
        );
        assert_eq!(info.url, "https://localhost:3001");
        assert_eq!(info.display_url, "https://chart:3001");
        assert!(info.use_https);
    }

    #[test]
    fn test_ids_are_unique_within_a_millisecond() {
        let mut clock = IdClock::default();
        assert_eq!(clock.next(1000), "server-1000");
        assert_eq!(clock.next(1000), "server-1000-1");
        assert_eq!(clock.next(1000), "server-1000-2");
        assert_eq!(clock.next(1001), "server-1001");
    }

    #[test]
    fn test_ids_survive_clock_stepping_back() {
        let mut clock = IdClock::default();
        assert_eq!(clock.next(2000), "server-2000");
        assert_eq!(clock.next(1500), "server-2000-1");
        assert_eq!(clock.next(2000), "server-2000-2");
        assert_eq!(clock.next(2001), "server-2001");
    }

    #[test]
    fn test_update_merges_fields() {
        let mut info = ServerInstance::for_tests(
            "server-1",
            3000,
            ServerMode::Http,
            PathBuf::from("/out/viz/index.html"),
        );
        ServerInfoUpdate {
            display_url: Some("http://app:3000".to_string()),
            analysis_file_name: Some("DIR:src".to_string()),
            ..Default::default()
        }
        .apply(&mut info);

        assert_eq!(info.display_url, "http://app:3000");
        assert_eq!(info.analysis_file_name.as_deref(), Some("DIR:src"));
        assert_eq!(info.url, "http://localhost:3000");
    }

    #[test]
    fn test_serialized_instance() {
        let info = ServerInstance::for_tests(
            "server-1",
            3000,
            ServerMode::Http,
            PathBuf::from("/out/viz/index.html"),
        );
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["displayUrl"], "http://index:3000");
        assert_eq!(json["protocol"], "http");
        assert_eq!(json["mode"], "HTTP");
        assert!(json.get("analysisFileName").is_none());
    }
}
