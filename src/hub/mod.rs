//! Collaboration hub: rooms, clients, and the broadcast registry
//!
//! The hub maps room ids to rooms. Rooms are created lazily on first
//! reference, each with its own event loop task, and persist for the
//! process lifetime.

pub mod client;
pub mod room;

pub use client::{Client, Transport};
pub use room::{Broadcast, Room};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

/// Process-wide registry of active rooms
pub struct CollaborationHub {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl CollaborationHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Return the room for `id`, creating it (and starting its event loop)
    /// on first reference.
    ///
    /// Rooms are created once per id but looked up once per connection, so
    /// the common case takes only the read lock; a miss escalates to the
    /// write lock and re-checks before inserting.
    pub async fn get_or_create_room(&self, id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(id) {
            return Arc::clone(room);
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(id) {
            return Arc::clone(room);
        }

        let room = Room::new(id.to_string());
        rooms.insert(id.to_string(), Arc::clone(&room));
        tokio::spawn(Arc::clone(&room).run());
        info!(room = %id, "created room");
        room
    }

    /// Number of rooms created so far
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for CollaborationHub {
    fn default() -> Self {
        Self::new()
    }
}
