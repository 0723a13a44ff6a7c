//! HTTP surface: health, certificate hash, CORS, and WebSocket routing
//!
//! A thin layer around the hub. Everything stateful lives behind
//! [`AppState`]; the handlers only translate between HTTP and the core.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::hub::CollaborationHub;
use crate::server::websocket;

/// Shared state handed to every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<CollaborationHub>,
    pub cert_hash: String,
    pub config: Arc<Config>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    webtransport: String,
}

#[derive(Debug, Serialize)]
struct CertHashResponse {
    hash: String,
}

/// Build the router with all HTTP endpoints and the CORS layer
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health))
        .route("/api/cert-hash", get(cert_hash))
        .route("/collab", get(websocket::ws_default))
        .route("/collab/", get(websocket::ws_default))
        .route("/collab/{room}", get(websocket::ws_room))
        .layer(cors)
        .with_state(state)
}

/// Serve the HTTP endpoints until the process exits
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| RelayError::network(format!("cannot bind HTTP listener: {}", e)))?;

    info!(port, "HTTP server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| RelayError::network(format!("HTTP server error: {}", e)))?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        webtransport: state.config.webtransport_url(),
    })
}

async fn cert_hash(State(state): State<AppState>) -> Json<CertHashResponse> {
    Json(CertHashResponse {
        hash: state.cert_hash.clone(),
    })
}

/// CORS for the configured frontend origin, credentials allowed.
///
/// Credentialed CORS forbids the wildcard origin, so a malformed origin
/// value falls back to echoing nothing rather than opening up.
fn cors_layer(config: &Config) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    if let Ok(origin) = config.frontend_origin.parse::<HeaderValue>() {
        cors = cors.allow_origin(origin);
    }
    cors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_shape() {
        let body = HealthResponse {
            status: "ok",
            webtransport: "https://localhost:4433".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["webtransport"], "https://localhost:4433");
    }

    #[test]
    fn test_cert_hash_response_shape() {
        let body = CertHashResponse {
            hash: "abc123=".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"hash":"abc123="}"#);
    }

    #[test]
    fn test_router_builds_with_default_config() {
        let state = AppState {
            hub: Arc::new(CollaborationHub::new()),
            cert_hash: String::new(),
            config: Arc::new(Config::default()),
        };
        let _router = router(state);
    }
}
