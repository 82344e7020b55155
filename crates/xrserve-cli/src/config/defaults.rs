use std::path::PathBuf;

pub fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_start_port() -> u16 {
    3000
}

pub fn default_end_port() -> u16 {
    3100
}

pub fn default_preferred_ports() -> Vec<u16> {
    vec![3000, 8080, 8000, 3001, 3002]
}

/// Quiet period before a data-file change is broadcast.
pub fn default_watch_settle_ms() -> u64 {
    300
}

pub fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

pub fn default_key_file() -> String {
    "xrserve_key.pem".to_string()
}

pub fn default_cert_file() -> String {
    "xrserve_cert.pem".to_string()
}
