//! Backend dialing.
//!
//! Every session dials the same backend address. Dialing is fail-fast:
//! one attempt bounded by the connect timeout, and on failure the frontend
//! connection is closed straight away.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::relay::{relay, RelayOptions, RelayStats};
use crate::error::SessionError;

/// Default connect timeout for backend connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Dials the backend and hands sessions to the relay.
#[derive(Debug, Clone)]
pub struct BackendConnector {
    /// Backend address (host:port), resolved on every dial.
    addr: String,
    /// Connect timeout.
    connect_timeout: Duration,
    /// Options applied to every relay.
    relay_options: RelayOptions,
}

impl BackendConnector {
    /// Create a connector with the default connect timeout.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a connector with a custom connect timeout.
    pub fn with_timeout(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            relay_options: RelayOptions::default(),
        }
    }

    /// Set the options used for relaying.
    pub fn with_relay_options(mut self, relay_options: RelayOptions) -> Self {
        self.relay_options = relay_options;
        self
    }

    /// Backend address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Limit on a single backend dial.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Open one connection to the backend.
    pub async fn connect(&self) -> io::Result<TcpStream> {
        debug!(backend_addr = %self.addr, "Connecting to backend");

        match timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str())).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
        }
    }

    /// Dial the backend and relay `frontend` to it until either side closes.
    ///
    /// Relay order is (backend, frontend), so `a_to_b` in the returned stats
    /// counts bytes sent from the backend to the client.
    pub async fn proxy_back<F>(&self, mut frontend: F) -> Result<RelayStats, SessionError>
    where
        F: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let backend = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    backend_addr = %self.addr,
                    error = %e,
                    "Backend connection failed"
                );
                if let Err(shutdown_err) = frontend.shutdown().await {
                    debug!(error = %shutdown_err, "Frontend shutdown failed");
                }
                drop(frontend);
                return Err(SessionError::Dial {
                    addr: self.addr.clone(),
                    source: e,
                });
            }
        };

        if let Ok(backend_local) = backend.local_addr() {
            debug!(
                backend_addr = %self.addr,
                local_addr = %backend_local,
                "Connected to backend"
            );
        }

        relay(backend, frontend, self.relay_options)
            .await
            .map_err(SessionError::from)
    }
}
