//! Atelier - Real-Time Collaboration Relay
//!
//! A relay server for collaborative-document clients. Members of a named
//! room exchange opaque binary frames; the server fans each frame out to
//! every other member with low latency. Payload bytes are never
//! interpreted or stored.
//!
//! ## Architecture
//!
//! Two transports are offered side by side:
//!
//! - **WebTransport** (QUIC): each session carries three bidirectional
//!   streams classified by a leading type byte, plus unreliable datagrams:
//!   - **Text stream** (0x01): document text operations
//!   - **Formatting stream** (0x02): formatting operations
//!   - **Structure stream** (0x03): structural operations
//!   - **Datagrams**: awareness and cursor updates, echo pings
//! - **WebSocket**: a single reliable binary channel, used as fallback
//!
//! Every room runs one event loop that serializes membership and
//! broadcast; every session runs a stream acceptor, a datagram receiver,
//! and an egress task gated on the streams-ready barrier. Slow recipients
//! lose frames instead of stalling the room.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atelier::{Config, CollaborationHub, server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let hub = Arc::new(CollaborationHub::new());
//!     let identity = server::ServerIdentity::load_or_generate(&config).await?;
//!     // ... start the WebTransport and HTTP listeners
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod protocol;

// Hub and transports
pub mod hub;
pub mod server;

// Re-export error types
pub use error::{RelayError, Result};

// Re-export core types
pub use config::Config;
pub use hub::{Broadcast, Client, CollaborationHub, Room, Transport};
pub use protocol::{Channel, SYNC_STEP2};
pub use server::{AppState, ServerIdentity, WebTransportServer};
