//! xrserve - local visualization server with live reload.
//!
//! Serves generated HTML/XR visualizations over HTTP or HTTPS on ports drawn
//! from a managed range, and pushes reload notifications to open pages over
//! Server-Sent Events when the page or its data files change.
//!
//! # Architecture
//!
//! - [`ports`] - Port allocation within the managed range
//! - [`livereload`] - SSE client registry, broadcasts and script injection
//! - [`handler`] - Per-server request handling
//! - [`server`] - Server registry, listeners, watchers and certificates
//! - [`context`] - Shared state handed to the server manager
//! - [`config`] - Layered configuration
//! - [`error`] - Error types
//! - [`logger`] / [`ui`] - Diagnostics and terminal messages
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use xrserve_cli::{ServeConfig, ServeContext, ServerManager, ServerMode};
//!
//! # async fn run() -> xrserve_cli::Result<()> {
//! let manager = ServerManager::new(ServeContext::new(ServeConfig::default()));
//! if let Some(server) = manager
//!     .create_server(Path::new("out/visualizations/app"), ServerMode::Http, None)
//!     .await?
//! {
//!     println!("serving at {}", server.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod livereload;
pub mod logger;
pub mod ports;
pub mod server;
pub mod ui;

pub use config::ServeConfig;
pub use context::ServeContext;
pub use error::{Result, ResultExt, ServeError};
pub use livereload::LiveReloadHub;
pub use ports::{PortAllocator, Protocol};
pub use server::{ServerInfoUpdate, ServerInstance, ServerManager, ServerMode};
