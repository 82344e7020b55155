//! Request handler factory.
//!
//! Builds the per-server axum [`Router`]: the live-reload handshake plus a
//! fallback that maps every other request onto a file under the server root.
//! The router is protocol-agnostic; the same one is served over plain TCP or
//! TLS.

mod resolve;

pub use resolve::{content_type_for, resolve_request_path, shared_data_dir};

use crate::livereload::{inject_dom_live_reload_script, inject_live_reload_script, LiveReloadHub};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use std::convert::Infallible;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error};

/// Cache policy for JSON so chart refreshes always see fresh data.
const JSON_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

/// Prefix of root directory names that hold DOM visualizations.
const DOM_ROOT_PREFIX: &str = "dom-";

/// Factory for a server's request handler.
#[derive(Clone)]
pub struct RequestHandler {
    root: PathBuf,
    entry_name: String,
    hub: Arc<LiveReloadHub>,
    dom: bool,
}

impl RequestHandler {
    /// Handler serving `root`, with `/` mapped to `entry`'s base name.
    pub fn new(root: impl Into<PathBuf>, entry: &Path, hub: Arc<LiveReloadHub>) -> Self {
        let root = root.into();
        let entry_name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.html".to_string());
        let dom = root
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(DOM_ROOT_PREFIX))
            .unwrap_or(false);

        Self {
            root,
            entry_name,
            hub,
            dom,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether HTML goes through the DOM injector.
    pub fn is_dom_visualization(&self) -> bool {
        self.dom
    }

    /// Build the router.
    ///
    /// - `/livereload` and `/live-reload`: SSE handshake
    /// - everything else: static files with live-reload injection into HTML
    /// - CORS open to any origin, so headsets on other hosts can fetch data
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/livereload", get(handle_live_reload))
            .route("/live-reload", get(handle_live_reload))
            .fallback(handle_request)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(Arc::new(self))
    }
}

type SharedHandler = Arc<RequestHandler>;

/// Open an SSE stream and register it with the live-reload hub.
///
/// The connection lives inside the body stream; when the client goes away
/// the body is dropped and the connection deregisters itself.
async fn handle_live_reload(State(handler): State<SharedHandler>) -> Response {
    let mut connection = handler.hub.add_sse_client();
    debug!(client = connection.id(), root = %handler.root.display(), "live-reload handshake");

    let stream = async_stream::stream! {
        yield Ok::<Bytes, Infallible>(Bytes::from_static(b"\n"));
        while let Some(frame) = connection.recv().await {
            yield Ok(frame);
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Serve a file from the server root.
async fn handle_request(State(handler): State<SharedHandler>, uri: Uri) -> Response {
    let request_path = uri.path();
    let resolved = resolve_request_path(&handler.root, &handler.entry_name, request_path);
    debug!(path = request_path, resolved = %resolved.display(), "request");

    let file_path = match locate_file(&handler.root, resolved).await {
        Ok(path) => path,
        Err(response) => return response,
    };

    let content = match tokio::fs::read(&file_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return plain(StatusCode::NOT_FOUND, "File not found".to_string());
        }
        Err(e) => {
            error!(path = %file_path.display(), error = %e, "failed to read file");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, format!("Server Error: {}", e));
        }
    };

    let content_type = content_type_for(&file_path);
    match content_type {
        "text/html" => {
            let html = String::from_utf8_lossy(&content);
            let injected = if handler.dom {
                inject_dom_live_reload_script(&html)
            } else {
                inject_live_reload_script(&html)
            };
            ([(header::CONTENT_TYPE, content_type)], injected).into_response()
        }
        "application/json" => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, JSON_CACHE_CONTROL),
            ],
            content,
        )
            .into_response(),
        _ => ([(header::CONTENT_TYPE, content_type)], content).into_response(),
    }
}

/// Turn a resolved path into the file to read.
///
/// Directories serve their `index.html`. A missing `latest-analysis.json`
/// falls back to the root's `data.json`. Anything else missing is a 404.
async fn locate_file(root: &Path, resolved: PathBuf) -> Result<PathBuf, Response> {
    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_dir() => {
            let index = resolved.join("index.html");
            if tokio::fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
                Ok(index)
            } else {
                Err(plain(
                    StatusCode::NOT_FOUND,
                    "Directory does not contain an index.html file".to_string(),
                ))
            }
        }
        Ok(_) => Ok(resolved),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let is_latest_analysis = resolved
                .file_name()
                .is_some_and(|n| n == "latest-analysis.json");
            if is_latest_analysis {
                let fallback = root.join("data.json");
                if tokio::fs::metadata(&fallback).await.is_ok_and(|m| m.is_file()) {
                    debug!(fallback = %fallback.display(), "serving data.json for latest-analysis.json");
                    return Ok(fallback);
                }
            }
            Err(plain(StatusCode::NOT_FOUND, "File not found".to_string()))
        }
        Err(e) => {
            error!(path = %resolved.display(), error = %e, "failed to stat file");
            Err(plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Server Error: {}", e),
            ))
        }
    }
}

fn plain(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}
