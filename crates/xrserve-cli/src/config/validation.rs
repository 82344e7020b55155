use crate::config::ServeConfig;
use crate::error::{ConfigError, Result};

impl ServeConfig {
    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.start_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "startPort".to_string(),
                value: "0".to_string(),
                hint: "Port 0 asks the OS for a random port and cannot be managed".to_string(),
            }
            .into());
        }

        if self.end_port < self.start_port {
            return Err(ConfigError::InvalidValue {
                field: "endPort".to_string(),
                value: self.end_port.to_string(),
                hint: format!("Must be at least startPort ({})", self.start_port),
            }
            .into());
        }

        if self.preferred_ports.contains(&0) {
            return Err(ConfigError::InvalidValue {
                field: "preferredPorts".to_string(),
                value: format!("{:?}", self.preferred_ports),
                hint: "Preferred ports must be non-zero".to_string(),
            }
            .into());
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "host".to_string(),
                value: String::new(),
                hint: "Use 127.0.0.1 for local-only serving or 0.0.0.0 for the LAN".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
