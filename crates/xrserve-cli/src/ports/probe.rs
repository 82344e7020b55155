//! OS-level port availability probing.

use async_trait::async_trait;
use tokio::net::TcpListener;

/// Answers "can a listener bind this port right now?".
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_port_available(&self, port: u16) -> bool;
}

/// Probes by binding a throwaway listener and closing it immediately.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    host: String,
}

impl SystemProbe {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

#[async_trait]
impl PortProbe for SystemProbe {
    async fn is_port_available(&self, port: u16) -> bool {
        match TcpListener::bind((self.host.as_str(), port)).await {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bound_port_is_unavailable() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = held.local_addr().unwrap().port();

        let probe = SystemProbe::default();
        assert!(!probe.is_port_available(port).await);

        drop(held);
        assert!(probe.is_port_available(port).await);
    }
}
