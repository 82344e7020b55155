//! Error handling for the xrserve crate.
//!
//! This module provides a hierarchical error type system using `thiserror`.
//! Each variant maps to one category of the serving subsystem's failure
//! taxonomy, so callers can decide whether a failure is fatal to the
//! current operation or only to a single request.
//!
//! # Architecture
//!
//! - **Top-level errors** (`ServeError`) represent broad categories of failures
//! - **Domain-specific errors** (`PortError`, `CertificateError`, `ConfigError`)
//!   carry the detail
//! - **Error conversion** is automatic via `#[from]` attributes
//! - **Context helpers** (`ResultExt`) attach file paths or messages
//!
//! # Example
//!
//! ```rust,no_run
//! use xrserve_cli::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn read_entry(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_path(path)
//! }
//! ```

use crate::ports::Protocol;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
///
/// Returned by the lifecycle manager and the CLI commands. Domain-specific
/// errors convert into it via `From`.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Configuration-related errors (invalid values, unreadable file, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Port allocation errors
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    /// Certificate material could not be obtained
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system or socket operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener-level errors
    #[error("Server error: {0}")]
    Server(String),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Port allocation errors.
#[derive(Debug, Error)]
pub enum PortError {
    /// Every port in the range is reserved, busy, or was last used with the
    /// other protocol.
    #[error("No compatible port found in range {start}-{end} for {protocol}. All ports are either in use or have protocol conflicts.")]
    Exhausted {
        /// First port of the configured range
        start: u16,
        /// Last port of the configured range (inclusive)
        end: u16,
        /// Protocol the caller asked for
        protocol: Protocol,
    },

    /// A port outside the configured range was handed to the allocator
    #[error("Port {port} is outside the managed range {start}-{end}")]
    OutOfRange {
        /// Offending port
        port: u16,
        /// First port of the configured range
        start: u16,
        /// Last port of the configured range (inclusive)
        end: u16,
    },
}

/// Certificate acquisition errors.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// One of the default key/cert files is missing
    #[error("Default certificates do not exist in {}\n\nHint: Place {key_file} and {cert_file} there or use custom certificates", .dir.display())]
    DefaultsMissing {
        /// Directory that was searched
        dir: PathBuf,
        /// Expected key file name
        key_file: String,
        /// Expected certificate file name
        cert_file: String,
    },

    /// The user did not provide a key or certificate file
    #[error("No {what} file was selected")]
    NotSelected {
        /// "private key" or "certificate"
        what: &'static str,
    },

    /// A key or certificate file could not be read
    #[error("Error reading certificate file {}: {source}", .path.display())]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// PEM material could not be turned into a TLS configuration
    #[error("Invalid certificate material: {0}")]
    Invalid(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested config file doesn't exist
    #[error("Config file not found: {}\n\nHint: Create an xrserve.config.json file or drop --config", .0.display())]
    NotFound(PathBuf),

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

/// Result type alias using `ServeError` as the default error type.
pub type Result<T, E = ServeError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a `NotFound` I/O error into `ServeError::FileNotFound(path)`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<ServeError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| {
            let err: ServeError = e.into();
            match err {
                ServeError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    ServeError::FileNotFound(path.as_ref().to_path_buf())
                }
                other => other,
            }
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: ServeError = e.into();
            ServeError::Custom(format!("{}: {}", msg, err))
        })
    }
}

/// Convert a `ServeError` into a miette report for terminal display.
pub fn serve_error_to_miette(err: ServeError) -> miette::Report {
    match err {
        ServeError::Port(e) => miette::miette!("Error creating server: {}", e),
        ServeError::Certificate(e) => miette::miette!("Error starting server: {}", e),
        ServeError::Config(e) => miette::miette!("Configuration error: {}", e),
        other => miette::miette!("{}", other),
    }
}
