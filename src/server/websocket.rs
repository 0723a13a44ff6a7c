//! WebSocket fallback adapter
//!
//! Clients that cannot speak WebTransport connect to the same `/collab/`
//! paths over WebSocket. Frames are relayed as opaque binary messages with
//! no per-channel framing; the channel byte produced by WebTransport peers
//! travels inside the payload untouched.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::hub::{Client, Room, Transport};
use crate::server::http::AppState;
use crate::server::webtransport::DEFAULT_ROOM;

/// Handler for `/collab` and `/collab/` (no room id)
pub async fn ws_default(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    upgrade(ws, DEFAULT_ROOM.to_string(), state)
}

/// Handler for `/collab/{room}`
pub async fn ws_room(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let room = if room.is_empty() {
        DEFAULT_ROOM.to_string()
    } else {
        room
    };
    upgrade(ws, room, state)
}

fn upgrade(ws: WebSocketUpgrade, room_id: String, state: AppState) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let room = state.hub.get_or_create_room(&room_id).await;
        handle_socket(socket, room).await;
    })
}

/// Relay one WebSocket connection until either direction ends
async fn handle_socket(socket: WebSocket, room: Arc<Room>) {
    let (client, mut outbound_rx) = Client::new(Transport::WebSocket);
    room.register(Arc::clone(&client)).await;
    info!(
        client = client.id(),
        room = %room.id(),
        "WebSocket connection established"
    );

    let (mut sink, mut stream) = socket.split();

    // Egress: drain the outbound queue into binary messages. Ends when the
    // room closes the queue on unregister or the peer goes away.
    let egress_client = client.id();
    let mut egress = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Binary(frame)).await.is_err() {
                warn!(client = egress_client, "WebSocket write failed");
                break;
            }
        }
    });

    // Ingress: binary frames become room broadcasts; text and control
    // frames are ignored.
    let ingress_room = Arc::clone(&room);
    let ingress_client = Arc::clone(&client);
    let mut ingress = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    ingress_room.broadcast(data, ingress_client.id()).await;
                }
                Ok(Message::Close(_)) => {
                    debug!(client = ingress_client.id(), "WebSocket closed by peer");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(client = ingress_client.id(), error = %e, "WebSocket read error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut egress => ingress.abort(),
        _ = &mut ingress => egress.abort(),
    }

    room.unregister(Arc::clone(&client)).await;
    info!(client = client.id(), room = %room.id(), "WebSocket connection closed");
}
