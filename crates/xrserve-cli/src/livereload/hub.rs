//! Registry of open SSE connections.
//!
//! One hub is shared by every server instance in the process, so a broadcast
//! reaches all connected pages regardless of which server they came from.

use super::LiveReloadEvent;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Frames buffered per client before broadcasts start skipping it.
const CLIENT_BUFFER: usize = 64;

/// Process-wide list of live-reload connections.
#[derive(Default)]
pub struct LiveReloadHub {
    clients: RwLock<HashMap<usize, mpsc::Sender<Bytes>>>,
    next_client_id: AtomicUsize,
}

/// One registered SSE connection.
///
/// Receives broadcast frames; dropping it removes the client from the hub,
/// which is how a browser disconnect deregisters the connection.
pub struct SseConnection {
    id: usize,
    rx: mpsc::Receiver<Bytes>,
    hub: Weak<LiveReloadHub>,
}

impl SseConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Wait for the next frame. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for SseConnection {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_sse_client(self.id);
        }
    }
}

impl LiveReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    pub fn add_sse_client(self: &Arc<Self>) -> SseConnection {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        debug!(client = id, "live-reload client connected");

        SseConnection {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Deregister a connection. Unknown ids are ignored.
    pub fn remove_sse_client(&self, id: usize) {
        if self.clients.write().remove(&id).is_some() {
            debug!(client = id, "live-reload client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Send `event` to every connection.
    ///
    /// Each write is independent: a full or closed connection is skipped and
    /// the rest still receive the frame. Closed connections are pruned.
    /// Returns how many connections accepted the frame.
    pub fn broadcast(&self, event: &LiveReloadEvent) -> usize {
        let frame = Bytes::from(event.frame());
        let clients: Vec<_> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in clients {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client = id, event = event.name(), "live-reload client is not draining, skipping");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut registry = self.clients.write();
            for id in closed {
                registry.remove(&id);
            }
        }

        debug!(event = event.name(), delivered, "live-reload broadcast");
        delivered
    }

    /// Ask every page to reload.
    pub fn notify_clients(&self) -> usize {
        self.broadcast(&LiveReloadEvent::Reload)
    }

    /// Ask every page to re-fetch its analysis data and rebuild charts.
    pub fn notify_clients_analysis_updated(&self) -> usize {
        self.broadcast(&LiveReloadEvent::AnalysisUpdated)
    }

    /// Ask every page for a data-only refresh.
    pub fn notify_clients_data_refresh(&self) -> usize {
        self.broadcast(&LiveReloadEvent::DataRefresh)
    }

    /// Push new markup to DOM visualizations.
    pub fn notify_clients_html_updated(&self, html: &str) -> usize {
        self.broadcast(&LiveReloadEvent::HtmlUpdated {
            html: html.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_client_registration() {
        let hub = Arc::new(LiveReloadHub::new());

        let first = hub.add_sse_client();
        let second = hub.add_sse_client();
        assert_eq!(hub.client_count(), 2);
        assert_ne!(first.id(), second.id());

        hub.remove_sse_client(first.id());
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn test_dropping_connection_deregisters() {
        let hub = Arc::new(LiveReloadHub::new());
        let conn = hub.add_sse_client();
        assert_eq!(hub.client_count(), 1);

        drop(conn);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let hub = Arc::new(LiveReloadHub::new());
        let mut a = hub.add_sse_client();
        let mut b = hub.add_sse_client();

        assert_eq!(hub.notify_clients_analysis_updated(), 2);

        for conn in [&mut a, &mut b] {
            let frame = timeout(Duration::from_millis(100), conn.recv())
                .await
                .expect("client did not receive broadcast")
                .unwrap();
            assert_eq!(&frame[..], b"event: analysisUpdated\ndata: updated\n\n");
        }
    }

    #[tokio::test]
    async fn test_full_client_does_not_block_others() {
        let hub = Arc::new(LiveReloadHub::new());
        let _stalled = hub.add_sse_client();
        let mut live = hub.add_sse_client();

        for _ in 0..CLIENT_BUFFER {
            hub.notify_clients();
            live.recv().await.unwrap();
        }

        // The stalled client's buffer is now full; the live one still gets frames.
        assert_eq!(hub.notify_clients_data_refresh(), 1);
        let frame = live.recv().await.unwrap();
        assert_eq!(&frame[..], b"event: dataRefresh\ndata: refreshed\n\n");
        assert_eq!(hub.client_count(), 2);
    }

    #[tokio::test]
    async fn test_html_update_reaches_client() {
        let hub = Arc::new(LiveReloadHub::new());
        let mut conn = hub.add_sse_client();

        assert_eq!(hub.notify_clients_html_updated("<a-entity babia-html></a-entity>\n"), 1);

        let frame = timeout(Duration::from_millis(100), conn.recv())
            .await
            .expect("client did not receive html update")
            .unwrap();
        let frame = std::str::from_utf8(&frame).unwrap();
        let data = frame
            .strip_prefix("event: htmlUpdated\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("malformed htmlUpdated frame");
        assert!(!data.contains('\n'));

        let payload: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(payload["htmlContent"], "<a-entity babia-html></a-entity>\n");
    }

    #[tokio::test]
    async fn test_broadcast_with_no_clients() {
        let hub = LiveReloadHub::new();
        assert_eq!(hub.notify_clients(), 0);
    }
}
