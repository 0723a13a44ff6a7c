//! Transport adapters and the external HTTP surface
//!
//! Two listeners run side by side: the QUIC endpoint upgrading
//! WebTransport sessions at `/collab/{room}`, and the HTTP server carrying
//! the WebSocket fallback on the same paths plus `/health` and
//! `/api/cert-hash`.

pub mod http;
pub mod identity;
pub mod websocket;
pub mod webtransport;

pub use http::AppState;
pub use identity::ServerIdentity;
pub use webtransport::WebTransportServer;
