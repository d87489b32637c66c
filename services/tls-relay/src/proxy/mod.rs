//! TLS-terminating TCP proxy.
//!
//! This module provides:
//! - The accept loop
//! - TLS termination of frontend connections
//! - Backend dialing (fail-fast)
//! - Bidirectional relay with coordinated shutdown
//!
//! ## Architecture
//!
//! ```text
//! Client --TLS--> Listener -> TlsTerminator -> BackendConnector --TCP--> Backend
//!                                                    |
//!                                                  relay()
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{BackendConnector, Listener, ListenerConfig, TlsTerminator};
//!
//! let terminator = Arc::new(TlsTerminator::new(&identity));
//! let connector = Arc::new(BackendConnector::new("127.0.0.1:8080"));
//!
//! let config = ListenerConfig::new("0.0.0.0:8443".parse()?);
//! let listener = Arc::new(Listener::bind(config, terminator, connector).await?);
//! listener.run().await?;
//! ```

mod backend;
mod listener;
mod relay;
mod tls;

pub use backend::{BackendConnector, DEFAULT_CONNECT_TIMEOUT};
pub use listener::{Listener, ListenerConfig, ListenerStats};
pub use relay::{relay, RelayOptions, RelayStats, RELAY_BUFFER_SIZE, SHUTDOWN_GRACE};
pub use tls::{TlsTerminator, DEFAULT_HANDSHAKE_TIMEOUT};
