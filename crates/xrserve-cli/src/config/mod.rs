//! Configuration with multi-source loading.
//!
//! Merges settings from CLI flags, environment variables, and an
//! `xrserve.config.json` file.
//! Priority: CLI > Environment > File > Defaults

mod defaults;
mod loading;
mod validation;

use crate::ports::{AllocatorConfig, PortRange};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use defaults::*;
pub use loading::{ConfigOverrides, CONFIG_FILE_NAME};

/// Server configuration - loaded from xrserve.config.json, env and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServeConfig {
    /// Interface servers bind and ports are probed on
    #[serde(default = "default_host")]
    pub host: String,

    /// First port of the managed range
    #[serde(default = "default_start_port")]
    pub start_port: u16,

    /// Last port of the managed range (inclusive)
    #[serde(default = "default_end_port")]
    pub end_port: u16,

    /// Ports tried, in order, before scanning the range
    #[serde(default = "default_preferred_ports")]
    pub preferred_ports: Vec<u16>,

    /// Settle delay for the data-file watcher, in milliseconds
    #[serde(default = "default_watch_settle_ms")]
    pub watch_settle_ms: u64,

    /// Directory holding the default certificate pair
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    #[serde(default = "default_key_file")]
    pub default_key_file: String,

    #[serde(default = "default_cert_file")]
    pub default_cert_file: String,

    /// Private key for `https-custom-certs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_key: Option<PathBuf>,

    /// Certificate for `https-custom-certs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_cert: Option<PathBuf>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            start_port: default_start_port(),
            end_port: default_end_port(),
            preferred_ports: default_preferred_ports(),
            watch_settle_ms: default_watch_settle_ms(),
            cert_dir: default_cert_dir(),
            default_key_file: default_key_file(),
            default_cert_file: default_cert_file(),
            custom_key: None,
            custom_cert: None,
        }
    }
}

impl ServeConfig {
    pub fn port_range(&self) -> PortRange {
        PortRange {
            start: self.start_port,
            end: self.end_port,
        }
    }

    /// Settings for the port allocator.
    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            range: self.port_range(),
            preferred_ports: self.preferred_ports.clone(),
        }
    }
}
