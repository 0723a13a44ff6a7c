//! Atelier relay server entry point
//!
//! Loads the configuration from the environment, initializes logging, and
//! runs the QUIC (WebTransport) endpoint and the HTTP/WebSocket fallback
//! server side by side.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use atelier::server::{self, AppState, ServerIdentity, WebTransportServer};
use atelier::{CollaborationHub, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = Config::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        http_port = config.http_port,
        quic_port = config.quic_port,
        "starting atelier relay"
    );

    let (identity, cert_hash) = ServerIdentity::load_or_generate(&config)
        .await?
        .into_parts();

    let hub = Arc::new(CollaborationHub::new());

    let webtransport = WebTransportServer::bind(config.quic_port, identity, Arc::clone(&hub))?;

    let state = AppState {
        hub,
        cert_hash,
        config: Arc::new(config.clone()),
    };

    tokio::try_join!(
        webtransport.serve(),
        server::http::serve(state, config.http_port),
    )?;

    Ok(())
}
