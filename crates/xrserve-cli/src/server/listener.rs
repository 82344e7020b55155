//! Native listener for one server instance.
//!
//! A [`Listener`] moves through `Creating → Listening → Closed`, or
//! `Creating → Failed` when the bind is refused. Binding is awaited by the
//! caller; serving runs in a spawned accept loop that serves each connection
//! with hyper, wrapped in TLS when an acceptor is given.

use axum::Router;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Consecutive accept failures after which the listener gives up.
const MAX_ACCEPT_ERRORS: u32 = 16;

/// Back-off between failed accepts.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Lifecycle state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Creating,
    Listening,
    Closed,
    Failed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerState::Creating => "creating",
            ListenerState::Listening => "listening",
            ListenerState::Closed => "closed",
            ListenerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Called from the accept loop when it gives up on its socket.
pub type FatalHook = Box<dyn FnOnce() + Send + 'static>;

pub struct Listener {
    state: Mutex<ListenerState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ListenerState::Creating),
            shutdown: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Bind `addr` and start serving `router`.
    ///
    /// On success the listener is `Listening` and the bound address is
    /// returned. A refused bind leaves it `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the bind error, or `Interrupted` if [`Listener::stop`] was
    /// called before the bind completed.
    pub async fn listen(
        &self,
        addr: impl ToSocketAddrs,
        router: Router,
        tls: Option<TlsAcceptor>,
        on_fatal: FatalHook,
    ) -> io::Result<SocketAddr> {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.transition(ListenerState::Creating, ListenerState::Failed);
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if *state != ListenerState::Creating {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "listener stopped before bind completed",
                ));
            }
            *state = ListenerState::Listening;
            *self.shutdown.lock() = Some(tx);
        }

        info!(addr = %local_addr, tls = tls.is_some(), "listening");
        tokio::spawn(accept_loop(listener, router, tls, rx, on_fatal));

        Ok(local_addr)
    }

    /// Stop accepting and drop open connections. Safe from any state.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        match *state {
            ListenerState::Creating | ListenerState::Listening => {
                *state = ListenerState::Closed;
                if let Some(tx) = self.shutdown.lock().take() {
                    let _ = tx.send(());
                }
            }
            ListenerState::Closed | ListenerState::Failed => {}
        }
    }

    fn transition(&self, from: ListenerState, to: ListenerState) {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    mut shutdown: oneshot::Receiver<()>,
    on_fatal: FatalHook,
) {
    let mut connections = JoinSet::new();
    let mut consecutive_errors = 0u32;
    let mut on_fatal = Some(on_fatal);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("listener shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    consecutive_errors = 0;
                    connections.spawn(serve_connection(stream, peer, router.clone(), tls.clone()));
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(error = %e, consecutive_errors, "accept failed");
                    if consecutive_errors >= MAX_ACCEPT_ERRORS {
                        error!(error = %e, "listener giving up after repeated accept failures");
                        if let Some(hook) = on_fatal.take() {
                            hook();
                        }
                        break;
                    }
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Long-lived SSE responses would otherwise keep the tasks alive.
    connections.abort_all();
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    tls: Option<TlsAcceptor>,
) {
    match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_http(tls_stream, peer, router).await,
            Err(e) => debug!(%peer, error = %e, "TLS handshake failed"),
        },
        None => serve_http(stream, peer, router).await,
    }
}

async fn serve_http<S>(stream: S, peer: SocketAddr, router: Router)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router))
        .await
    {
        debug!(%peer, error = %e, "connection error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn router() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    fn noop() -> FatalHook {
        Box::new(|| {})
    }

    #[tokio::test]
    async fn test_listen_then_stop() {
        let listener = Listener::new();
        assert_eq!(listener.state(), ListenerState::Creating);

        let addr = listener
            .listen("127.0.0.1:0", router(), None, noop())
            .await
            .unwrap();
        assert_eq!(listener.state(), ListenerState::Listening);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("ok"));

        listener.stop();
        assert_eq!(listener.state(), ListenerState::Closed);
        listener.stop();
        assert_eq!(listener.state(), ListenerState::Closed);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = held.local_addr().unwrap();

        let listener = Listener::new();
        let err = listener.listen(addr, router(), None, noop()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        assert_eq!(listener.state(), ListenerState::Failed);

        listener.stop();
        assert_eq!(listener.state(), ListenerState::Failed);
    }

    #[tokio::test]
    async fn test_stop_before_listen() {
        let listener = Listener::new();
        listener.stop();

        let err = listener
            .listen("127.0.0.1:0", router(), None, noop())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(listener.state(), ListenerState::Closed);
    }
}
