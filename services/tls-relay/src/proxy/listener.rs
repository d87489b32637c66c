//! Accept loop and per-connection handling.
//!
//! Each accepted connection runs in its own task:
//!
//! ```text
//! Accepted -> Handshaking -> Dialing -> Relaying -> Closed
//!                  |             |
//!                  +-> Closed    +-> Closed
//! ```
//!
//! Failures stay inside the connection task. The loop itself only stops if
//! the process does.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, Instrument};

use super::backend::BackendConnector;
use super::relay::RelayStats;
use super::tls::TlsTerminator;
use crate::error::SessionError;

/// Default pause after a failed accept.
pub const DEFAULT_ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Pause after an accept error before accepting again.
    pub accept_error_backoff: Duration,
}

impl ListenerConfig {
    /// Create a new listener configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            accept_error_backoff: DEFAULT_ACCEPT_ERROR_BACKOFF,
        }
    }
}

/// Lifecycle counters for a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being handled.
    pub connections_active: AtomicU64,
    /// Connections fully closed.
    pub connections_closed: AtomicU64,
    /// Failed or timed-out TLS handshakes.
    pub handshakes_failed: AtomicU64,
    /// Backend dial failures.
    pub backend_failed: AtomicU64,
    /// Sessions that ended with a relay error.
    pub relays_failed: AtomicU64,
    /// Bytes proxied to backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes proxied from backend.
    pub bytes_from_backend: AtomicU64,
}

/// TLS listener for the relay.
pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    terminator: Arc<TlsTerminator>,
    connector: Arc<BackendConnector>,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind the frontend socket.
    pub async fn bind(
        config: ListenerConfig,
        terminator: Arc<TlsTerminator>,
        connector: Arc<BackendConnector>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            backend_addr = %connector.addr(),
            "started listening for TLS connections on {local_addr}"
        );

        Ok(Self {
            config,
            listener,
            terminator,
            connector,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Run the accept loop.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .connections_active
                        .fetch_add(1, Ordering::Relaxed);

                    let listener = Arc::clone(&self);
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(
                        async move {
                            match listener.handle_connection(stream, peer_addr).await {
                                Ok(relayed) => debug!(
                                    bytes_to_backend = relayed.b_to_a,
                                    bytes_from_backend = relayed.a_to_b,
                                    "Connection closed"
                                ),
                                Err(e) => debug!(
                                    reason = e.reason_code(),
                                    error = %e,
                                    "Connection closed with error"
                                ),
                            }

                            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(self.config.accept_error_backoff).await;
                }
            }
        }
    }

    /// Handle a single connection: handshake, dial, relay.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<RelayStats, SessionError> {
        debug!(peer_addr = %peer_addr, "Handshaking");

        let frontend = match self.terminator.accept(stream).await {
            Ok(tls_stream) => tls_stream,
            Err(e) => {
                self.stats.handshakes_failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        debug!("Handshake complete, dialing backend");

        match self.connector.proxy_back(frontend).await {
            Ok(relayed) => {
                self.record_bytes(&relayed);
                Ok(relayed)
            }
            Err(e) => {
                match &e {
                    SessionError::Relay(relay_err) => {
                        self.record_bytes(&relay_err.stats);
                        self.stats.relays_failed.fetch_add(1, Ordering::Relaxed);
                    }
                    SessionError::Dial { .. } => {
                        self.stats.backend_failed.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                Err(e)
            }
        }
    }

    fn record_bytes(&self, relayed: &RelayStats) {
        // Relay order is (backend, frontend).
        self.stats
            .bytes_to_backend
            .fetch_add(relayed.b_to_a, Ordering::Relaxed);
        self.stats
            .bytes_from_backend
            .fetch_add(relayed.a_to_b, Ordering::Relaxed);
    }
}
