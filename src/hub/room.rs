//! Room event loop
//!
//! A room is a broadcast domain. All membership changes and reliable
//! broadcasts flow through three channels consumed by a single loop task,
//! so the membership set has exactly one writer. Datagrams bypass the loop
//! (and the per-client queues) through a read-locked direct fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, trace};

use super::client::Client;

/// Capacity of the broadcast channel
pub const BROADCAST_BUFFER: usize = 256;

/// Capacity of the register/unregister channels
const MEMBERSHIP_BUFFER: usize = 64;

/// Interval of the member-count heartbeat log
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// A frame queued for relay, tagged with its sender
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub frame: Bytes,
    pub sender: u64,
}

struct Inbox {
    register_rx: mpsc::Receiver<Arc<Client>>,
    unregister_rx: mpsc::Receiver<Arc<Client>>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
}

/// A collaboration room
pub struct Room {
    id: String,
    members: RwLock<HashMap<u64, Arc<Client>>>,
    register_tx: mpsc::Sender<Arc<Client>>,
    unregister_tx: mpsc::Sender<Arc<Client>>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    inbox: Mutex<Option<Inbox>>,
}

impl Room {
    /// Create a new room. The caller spawns [`Room::run`] exactly once.
    pub fn new(id: String) -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(MEMBERSHIP_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(MEMBERSHIP_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_BUFFER);

        Arc::new(Self {
            id,
            members: RwLock::new(HashMap::new()),
            register_tx,
            unregister_tx,
            broadcast_tx,
            inbox: Mutex::new(Some(Inbox {
                register_rx,
                unregister_rx,
                broadcast_rx,
            })),
        })
    }

    /// Room id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of registered members
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Submit a client for registration
    pub async fn register(&self, client: Arc<Client>) {
        let _ = self.register_tx.send(client).await;
    }

    /// Submit a client for removal. Unknown clients are a no-op.
    pub async fn unregister(&self, client: Arc<Client>) {
        let _ = self.unregister_tx.send(client).await;
    }

    /// Submit a frame for relay to every member except the sender
    pub async fn broadcast(&self, frame: Bytes, sender: u64) {
        let _ = self.broadcast_tx.send(Broadcast { frame, sender }).await;
    }

    /// Fan a datagram out to every member except the sender.
    ///
    /// Datagrams do not traverse the per-client outbound queues: they are
    /// unreliable by transport contract and must not compete with reliable
    /// frames for queue slots. Members without a datagram hook (WebSocket
    /// clients) are skipped.
    pub async fn broadcast_datagram(&self, payload: &Bytes, sender: u64) {
        let members = self.members.read().await;
        for (id, client) in members.iter() {
            if *id == sender {
                continue;
            }
            client.send_datagram(payload.clone());
        }
    }

    /// Run the room's event loop.
    ///
    /// The loop is the only writer of the membership set. A second call is
    /// a no-op.
    pub async fn run(self: Arc<Self>) {
        let inbox = self.inbox.lock().unwrap().take();
        let Some(mut inbox) = inbox else {
            return;
        };

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(client) = inbox.register_rx.recv() => {
                    self.handle_register(client).await;
                }
                Some(client) = inbox.unregister_rx.recv() => {
                    self.handle_unregister(client).await;
                }
                Some(broadcast) = inbox.broadcast_rx.recv() => {
                    self.handle_broadcast(broadcast).await;
                }
                _ = heartbeat.tick() => {
                    let count = self.members.read().await.len();
                    if count > 0 {
                        debug!(room = %self.id, clients = count, "room heartbeat");
                    }
                }
                else => break,
            }
        }
    }

    async fn handle_register(&self, client: Arc<Client>) {
        let count = {
            let mut members = self.members.write().await;
            members.insert(client.id(), Arc::clone(&client));
            members.len()
        };
        info!(
            room = %self.id,
            client = client.id(),
            transport = %client.transport(),
            total = count,
            "client joined room"
        );
    }

    async fn handle_unregister(&self, client: Arc<Client>) {
        let removed = {
            let mut members = self.members.write().await;
            members.remove(&client.id())
        };

        // Closing only after removal keeps the close exactly-once: a client
        // absent from the set can no longer reach this path.
        if let Some(client) = removed {
            client.close_outbound();
            let count = self.members.read().await.len();
            info!(
                room = %self.id,
                client = client.id(),
                remaining = count,
                "client left room"
            );
        }
    }

    async fn handle_broadcast(&self, broadcast: Broadcast) {
        let members = self.members.read().await;
        for (id, client) in members.iter() {
            if *id == broadcast.sender {
                continue;
            }
            if !client.try_enqueue(broadcast.frame.clone()) {
                // Slow recipient: drop this frame for them and move on.
                trace!(
                    room = %self.id,
                    client = id,
                    "outbound queue full, frame dropped"
                );
            }
        }
    }
}
