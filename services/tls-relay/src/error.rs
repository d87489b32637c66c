//! Error types for the relay.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::proxy::RelayStats;

/// Failure of a single proxied session.
///
/// These never leave the task that handles the connection; the accept loop
/// only logs them.
#[derive(Debug, Error)]
pub enum SessionError {
    /// TLS handshake with the client failed.
    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// Client did not finish the TLS handshake in time.
    #[error("tls handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Backend could not be dialed.
    #[error("backend dial to {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Read or write failure while relaying.
    #[error("relay failed: {0}")]
    Relay(#[from] RelayError),
}

impl SessionError {
    /// Get the short reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SessionError::Handshake(_) => "handshake_failed",
            SessionError::HandshakeTimeout(_) => "handshake_timeout",
            SessionError::Dial { .. } => "dial_failed",
            SessionError::Relay(_) => "relay_failed",
        }
    }
}

/// A relay that ended on a read or write error.
#[derive(Debug, Error)]
#[error("{source} (after {} bytes a->b, {} bytes b->a)", .stats.a_to_b, .stats.b_to_a)]
pub struct RelayError {
    /// Bytes moved before the session ended.
    pub stats: RelayStats,
    /// Error of the direction that ended the session.
    #[source]
    pub source: io::Error,
}

/// Failure to load the server certificate and key.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// PEM file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// PEM data could not be parsed.
    #[error("malformed PEM: {0}")]
    Pem(#[source] io::Error),

    /// No certificate block in the certificate PEM.
    #[error("no certificates found")]
    NoCertificates,

    /// No private key block in the key PEM.
    #[error("no private key found")]
    NoPrivateKey,

    /// rustls refused the certificate/key pair.
    #[error("rejected by TLS configuration: {0}")]
    Rejected(#[from] rustls::Error),
}
