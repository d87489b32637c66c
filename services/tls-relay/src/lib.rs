pub mod config;
pub mod error;
pub mod identity;
pub mod proxy;

pub use config::{Config, PemSource};
pub use error::{IdentityError, RelayError, SessionError};
pub use identity::ServerIdentity;
pub use proxy::{
    relay, BackendConnector, Listener, ListenerConfig, ListenerStats, RelayOptions, RelayStats,
    TlsTerminator,
};
