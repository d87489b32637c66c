//! tls-relay
//!
//! TLS-terminating TCP proxy.
//!
//! This service:
//! - Accepts TLS connections on FRONT_SERVICE
//! - Terminates TLS with the configured certificate and key
//! - Dials BACK_SERVICE once per connection (no retry)
//! - Relays bytes both ways until either side closes

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tls_relay::{
    BackendConnector, Config, Listener, ListenerConfig, RelayOptions, ServerIdentity,
    TlsTerminator,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tls-relay");
    info!(
        front_service = %config.front_service,
        back_service = %config.back_service,
        connect_timeout_ms = config.connect_timeout.as_millis() as u64,
        handshake_timeout_ms = config.handshake_timeout.as_millis() as u64,
        idle_timeout_secs = config.idle_timeout.map(|d| d.as_secs()),
        "Configuration loaded"
    );

    let identity =
        ServerIdentity::load(&config.cert, &config.key).context("Failed to load server identity")?;

    let terminator =
        Arc::new(TlsTerminator::new(&identity).with_handshake_timeout(config.handshake_timeout));
    let connector = Arc::new(
        BackendConnector::with_timeout(config.back_service.clone(), config.connect_timeout)
            .with_relay_options(RelayOptions {
                idle_timeout: config.idle_timeout,
            }),
    );

    let listener = Listener::bind(
        ListenerConfig::new(config.front_service),
        terminator,
        connector,
    )
    .await
    .with_context(|| format!("Failed to bind {}", config.front_service))?;
    let listener = Arc::new(listener);

    // In-flight sessions are their own tasks; only the accept loop is raced here.
    tokio::select! {
        result = listener.run() => result.context("Listener failed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
