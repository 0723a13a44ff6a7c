//! Process-wide configuration read from the environment
//!
//! Every knob has a default so the relay runs with no environment at all.
//! Malformed port values fall back to the default with a warning; only
//! unreadable TLS material is fatal, and that is checked at identity load
//! time, not here.

use std::env;

use tracing::warn;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the HTTPS/WebSocket fallback server
    pub http_port: u16,
    /// Port for the QUIC (WebTransport) endpoint
    pub quic_port: u16,
    /// Path to the TLS certificate (PEM)
    pub cert_file: String,
    /// Path to the TLS private key (PEM)
    pub key_file: String,
    /// Public hostname advertised to clients
    pub domain: String,
    /// Frontend origin admitted by the CORS layer
    pub frontend_origin: String,
}

impl Config {
    /// Build the configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            http_port: port_or(env::var("HTTP_PORT").ok(), "HTTP_PORT", 8080),
            quic_port: port_or(env::var("QUIC_PORT").ok(), "QUIC_PORT", 4433),
            cert_file: string_or(env::var("CERT_FILE").ok(), "localhost.pem"),
            key_file: string_or(env::var("KEY_FILE").ok(), "localhost.key"),
            domain: string_or(env::var("DOMAIN").ok(), "localhost"),
            frontend_origin: string_or(
                env::var("FRONTEND_ORIGIN").ok(),
                "http://localhost:3000",
            ),
        }
    }

    /// URL of the WebTransport endpoint, advertised by `/health`
    pub fn webtransport_url(&self) -> String {
        format!("https://{}:{}", self.domain, self.quic_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            quic_port: 4433,
            cert_file: "localhost.pem".to_string(),
            key_file: "localhost.key".to_string(),
            domain: "localhost".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
        }
    }
}

fn string_or(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn port_or(value: Option<String>, key: &str, fallback: u16) -> u16 {
    match value {
        Some(raw) if !raw.is_empty() => match raw.parse() {
            Ok(port) => port,
            Err(_) => {
                warn!(key, value = %raw, fallback, "invalid port value, using default");
                fallback
            }
        },
        _ => fallback,
    }
}
