//! TLS termination for accepted frontend connections.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::error::SessionError;
use crate::identity::ServerIdentity;

/// Default limit for a client to complete the TLS handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server side of the TLS handshake, shared by every connection task.
#[derive(Clone)]
pub struct TlsTerminator {
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl TlsTerminator {
    /// Create a terminator presenting the given identity.
    pub fn new(identity: &ServerIdentity) -> Self {
        Self {
            acceptor: TlsAcceptor::from(identity.server_config()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Limit on a client completing the handshake.
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Complete the server handshake on a raw stream.
    ///
    /// On failure the raw stream is dropped (closed) and nothing is
    /// forwarded anywhere.
    pub async fn accept<S>(&self, stream: S) -> Result<TlsStream<S>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match timeout(self.handshake_timeout, self.acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => Ok(tls_stream),
            Ok(Err(e)) => Err(SessionError::Handshake(e)),
            Err(_) => Err(SessionError::HandshakeTimeout(self.handshake_timeout)),
        }
    }
}
