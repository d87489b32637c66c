//! Server identity (certificate chain + private key).
//!
//! Loaded once at startup and turned into an immutable rustls
//! `ServerConfig` that every session shares.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::config::PemSource;
use crate::error::IdentityError;

/// TLS server identity shared read-only across sessions.
#[derive(Clone)]
pub struct ServerIdentity {
    config: Arc<ServerConfig>,
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity").finish_non_exhaustive()
    }
}

impl ServerIdentity {
    /// Build an identity from PEM-encoded certificate chain and private key.
    ///
    /// The key may be PKCS#1 (`RSA PRIVATE KEY`), PKCS#8 or SEC1.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, IdentityError> {
        let certs = parse_certificates(cert_pem)?;
        let key = parse_private_key(key_pem)?;

        let provider = rustls::crypto::ring::default_provider();
        let config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Build an identity from PEM files on disk.
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self, IdentityError> {
        let cert_pem = read_pem_file(cert_path)?;
        let key_pem = read_pem_file(key_path)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Build an identity from configured sources (inline or file).
    pub fn load(cert: &PemSource, key: &PemSource) -> Result<Self, IdentityError> {
        let cert_pem = cert.read()?;
        let key_pem = key.read()?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// The rustls configuration for accepting connections.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }
}

impl PemSource {
    fn read(&self) -> Result<Vec<u8>, IdentityError> {
        match self {
            PemSource::Inline(pem) => Ok(pem.as_bytes().to_vec()),
            PemSource::File(path) => read_pem_file(path),
        }
    }
}

fn read_pem_file(path: &Path) -> Result<Vec<u8>, IdentityError> {
    fs::read(path).map_err(|source| IdentityError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certificates(mut pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
    let certs = rustls_pemfile::certs(&mut pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(IdentityError::Pem)?;

    if certs.is_empty() {
        return Err(IdentityError::NoCertificates);
    }
    Ok(certs)
}

fn parse_private_key(mut pem: &[u8]) -> Result<PrivateKeyDer<'static>, IdentityError> {
    rustls_pemfile::private_key(&mut pem)
        .map_err(IdentityError::Pem)?
        .ok_or(IdentityError::NoPrivateKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (cert.cert.pem(), cert.key_pair.serialize_pem())
    }

    #[test]
    fn test_identity_from_pem() {
        let (cert, key) = self_signed();
        let identity = ServerIdentity::from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
        let config = identity.server_config();
        assert!(Arc::ptr_eq(&config, &identity.server_config()));
    }

    #[test]
    fn test_identity_without_certificate() {
        let (_, key) = self_signed();
        let err = ServerIdentity::from_pem(key.as_bytes(), key.as_bytes()).unwrap_err();
        assert!(matches!(err, IdentityError::NoCertificates));
    }

    #[test]
    fn test_identity_without_key() {
        let (cert, _) = self_signed();
        let err = ServerIdentity::from_pem(cert.as_bytes(), cert.as_bytes()).unwrap_err();
        assert!(matches!(err, IdentityError::NoPrivateKey));
    }

    #[test]
    fn test_identity_missing_file() {
        let err = ServerIdentity::from_files(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }
}
