//! Certificate acquisition and TLS setup for HTTPS servers.

use crate::config::ServeConfig;
use crate::error::CertificateError;
use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fmt;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

/// PEM-encoded key and certificate chain.
#[derive(Clone)]
pub struct CertificatePair {
    pub key: Vec<u8>,
    pub cert: Vec<u8>,
}

impl fmt::Debug for CertificatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificatePair")
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .finish()
    }
}

/// Source of key/certificate material.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    /// Load the default pair, or the user-supplied one.
    async fn certificates(&self, use_default_certs: bool) -> Result<CertificatePair, CertificateError>;

    /// Whether both default files are present.
    fn default_certificates_exist(&self) -> bool;
}

/// Reads certificates from disk.
///
/// Defaults live in `cert_dir`; custom files come from explicit paths.
#[derive(Debug, Clone)]
pub struct FileCertificateProvider {
    cert_dir: PathBuf,
    default_key_file: String,
    default_cert_file: String,
    custom_key: Option<PathBuf>,
    custom_cert: Option<PathBuf>,
}

impl FileCertificateProvider {
    pub fn from_config(config: &ServeConfig) -> Self {
        Self {
            cert_dir: config.cert_dir.clone(),
            default_key_file: config.default_key_file.clone(),
            default_cert_file: config.default_cert_file.clone(),
            custom_key: config.custom_key.clone(),
            custom_cert: config.custom_cert.clone(),
        }
    }

    fn default_key_path(&self) -> PathBuf {
        self.cert_dir.join(&self.default_key_file)
    }

    fn default_cert_path(&self) -> PathBuf {
        self.cert_dir.join(&self.default_cert_file)
    }
}

#[async_trait]
impl CertificateProvider for FileCertificateProvider {
    async fn certificates(&self, use_default_certs: bool) -> Result<CertificatePair, CertificateError> {
        let (key_path, cert_path) = if use_default_certs {
            if !self.default_certificates_exist() {
                return Err(CertificateError::DefaultsMissing {
                    dir: self.cert_dir.clone(),
                    key_file: self.default_key_file.clone(),
                    cert_file: self.default_cert_file.clone(),
                });
            }
            (self.default_key_path(), self.default_cert_path())
        } else {
            let key = self
                .custom_key
                .clone()
                .ok_or(CertificateError::NotSelected { what: "private key" })?;
            let cert = self
                .custom_cert
                .clone()
                .ok_or(CertificateError::NotSelected { what: "certificate" })?;
            (key, cert)
        };

        debug!(key = %key_path.display(), cert = %cert_path.display(), "loading certificates");

        Ok(CertificatePair {
            key: read_pem(&key_path).await?,
            cert: read_pem(&cert_path).await?,
        })
    }

    fn default_certificates_exist(&self) -> bool {
        self.default_key_path().is_file() && self.default_cert_path().is_file()
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, CertificateError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| CertificateError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Build a TLS acceptor from a PEM pair.
pub fn tls_acceptor(pair: &CertificatePair) -> Result<TlsAcceptor, CertificateError> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(pair.cert.as_slice()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| CertificateError::Invalid(format!("failed to parse certificate: {}", e)))?;
    if certs.is_empty() {
        return Err(CertificateError::Invalid(
            "no certificate found in certificate file".to_string(),
        ));
    }

    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut BufReader::new(pair.key.as_slice()))
            .map_err(|e| CertificateError::Invalid(format!("failed to parse private key: {}", e)))?
            .ok_or_else(|| CertificateError::Invalid("no private key found in key file".to_string()))?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| CertificateError::Invalid(e.to_string()))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| CertificateError::Invalid(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider(dir: &Path) -> FileCertificateProvider {
        FileCertificateProvider {
            cert_dir: dir.to_path_buf(),
            default_key_file: "xrserve_key.pem".to_string(),
            default_cert_file: "xrserve_cert.pem".to_string(),
            custom_key: None,
            custom_cert: None,
        }
    }

    #[tokio::test]
    async fn test_missing_defaults() {
        let temp = TempDir::new().unwrap();
        let provider = provider(temp.path());

        assert!(!provider.default_certificates_exist());
        let err = provider.certificates(true).await.unwrap_err();
        assert!(matches!(err, CertificateError::DefaultsMissing { .. }));
    }

    #[tokio::test]
    async fn test_defaults_are_read() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("xrserve_key.pem"), "KEY").unwrap();
        std::fs::write(temp.path().join("xrserve_cert.pem"), "CERT").unwrap();

        let provider = provider(temp.path());
        assert!(provider.default_certificates_exist());

        let pair = provider.certificates(true).await.unwrap();
        assert_eq!(pair.key, b"KEY");
        assert_eq!(pair.cert, b"CERT");
    }

    #[tokio::test]
    async fn test_custom_requires_both_files() {
        let temp = TempDir::new().unwrap();
        let mut provider = provider(temp.path());

        let err = provider.certificates(false).await.unwrap_err();
        assert_eq!(err.to_string(), "No private key file was selected");

        provider.custom_key = Some(temp.path().join("key.pem"));
        let err = provider.certificates(false).await.unwrap_err();
        assert_eq!(err.to_string(), "No certificate file was selected");
    }

    #[tokio::test]
    async fn test_unreadable_custom_file() {
        let temp = TempDir::new().unwrap();
        let mut provider = provider(temp.path());
        provider.custom_key = Some(temp.path().join("missing-key.pem"));
        provider.custom_cert = Some(temp.path().join("missing-cert.pem"));

        let err = provider.certificates(false).await.unwrap_err();
        assert!(matches!(err, CertificateError::Read { .. }));
    }

    #[test]
    fn test_garbage_pem_is_rejected() {
        let pair = CertificatePair {
            key: b"not a key".to_vec(),
            cert: b"not a cert".to_vec(),
        };
        assert!(matches!(tls_acceptor(&pair), Err(CertificateError::Invalid(_))));
    }

    #[test]
    fn test_self_signed_pair_builds_acceptor() {
        let pair = CertificatePair {
            key: include_bytes!("../../tests/fixtures/certs/xrserve_key.pem").to_vec(),
            cert: include_bytes!("../../tests/fixtures/certs/xrserve_cert.pem").to_vec(),
        };
        assert!(tls_acceptor(&pair).is_ok());
    }

    #[test]
    fn test_certificate_without_key_is_rejected() {
        let pair = CertificatePair {
            key: Vec::new(),
            cert: include_bytes!("../../tests/fixtures/certs/xrserve_cert.pem").to_vec(),
        };
        let err = tls_acceptor(&pair).err().unwrap();
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn test_debug_hides_material() {
        let pair = CertificatePair {
            key: b"secret".to_vec(),
            cert: b"public".to_vec(),
        };
        let debug = format!("{:?}", pair);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("6 bytes"));
    }
}
