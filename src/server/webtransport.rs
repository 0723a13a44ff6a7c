//! WebTransport session adapter
//!
//! The protocol-heaviest component. Each accepted session runs three
//! tasks: a stream acceptor that classifies incoming bidirectional streams
//! by their leading type byte, a datagram receiver, and an egress task
//! that drains the client's outbound queue onto the right stream (or out
//! as a datagram). The session handler itself blocks on the session-closed
//! signal and tears everything down when it fires.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wtransport::endpoint::IncomingSession;
use wtransport::{Connection, Endpoint, Identity, RecvStream, SendStream, ServerConfig};

use crate::error::{RelayError, Result};
use crate::hub::{Client, CollaborationHub, Room, Transport};
use crate::protocol::{self, Channel, SYNC_STEP2};

/// Room joined when the connect path carries no room id
pub const DEFAULT_ROOM: &str = "default";

/// Path prefix the collaboration endpoint is mounted at
const COLLAB_PREFIX: &str = "/collab";

/// Datagrams of exactly this size are echoed back as latency pings
const PING_DATAGRAM_LEN: usize = 8;

/// QUIC endpoint accepting WebTransport collaboration sessions
pub struct WebTransportServer {
    endpoint: Endpoint<wtransport::endpoint::endpoint_side::Server>,
    hub: Arc<CollaborationHub>,
}

impl WebTransportServer {
    /// Bind the QUIC endpoint on the given UDP port
    pub fn bind(port: u16, identity: Identity, hub: Arc<CollaborationHub>) -> Result<Self> {
        let config = ServerConfig::builder()
            .with_bind_default(port)
            .with_identity(identity)
            .keep_alive_interval(Some(Duration::from_secs(3)))
            .build();

        let endpoint = Endpoint::server(config)
            .map_err(|e| RelayError::network(format!("cannot bind QUIC endpoint: {}", e)))?;

        Ok(Self { endpoint, hub })
    }

    /// UDP port the endpoint actually bound (useful with port 0)
    pub fn local_port(&self) -> Result<u16> {
        let addr = self
            .endpoint
            .local_addr()
            .map_err(|e| RelayError::network(format!("local addr: {}", e)))?;
        Ok(addr.port())
    }

    /// Accept sessions until the process exits
    pub async fn serve(self) -> Result<()> {
        info!(port = self.local_port()?, "WebTransport endpoint listening");

        loop {
            let incoming = self.endpoint.accept().await;
            let hub = Arc::clone(&self.hub);
            tokio::spawn(async move {
                if let Err(e) = handle_session(incoming, hub).await {
                    warn!(error = %e, "WebTransport session failed");
                }
            });
        }
    }
}

/// Upgrade one incoming session and relay until it closes
async fn handle_session(incoming: IncomingSession, hub: Arc<CollaborationHub>) -> Result<()> {
    let request = incoming.await?;

    let path = request.path().to_string();
    let Some(room_id) = room_id_from_path(&path) else {
        debug!(%path, "rejecting session for unknown path");
        request.not_found().await;
        return Ok(());
    };

    let connection = Arc::new(request.accept().await?);
    let session_id = Uuid::new_v4();

    let room = hub.get_or_create_room(&room_id).await;
    let (client, outbound_rx) = Client::new(Transport::WebTransport);

    // Attach the datagram hook before registering, so room fan-outs never
    // observe a member that silently drops datagrams.
    let datagram_conn = Arc::clone(&connection);
    let datagram_client = client.id();
    client.set_datagram_sender(Box::new(move |payload| {
        if let Err(e) = datagram_conn.send_datagram(payload) {
            debug!(client = datagram_client, error = %e, "datagram fan-out send failed");
        }
    }));

    room.register(Arc::clone(&client)).await;
    info!(
        session = %session_id,
        client = client.id(),
        room = %room.id(),
        "WebTransport session established"
    );

    let acceptor = tokio::spawn(accept_streams(
        Arc::clone(&connection),
        Arc::clone(&client),
        Arc::clone(&room),
    ));
    let datagrams = tokio::spawn(receive_datagrams(
        Arc::clone(&connection),
        Arc::clone(&client),
        Arc::clone(&room),
    ));
    let egress = tokio::spawn(drain_outbound(
        Arc::clone(&connection),
        Arc::clone(&client),
        outbound_rx,
    ));

    let reason = connection.closed().await;
    debug!(session = %session_id, client = client.id(), %reason, "session closed");

    room.unregister(Arc::clone(&client)).await;
    acceptor.abort();
    datagrams.abort();
    egress.abort();

    info!(session = %session_id, client = client.id(), "WebTransport session torn down");
    Ok(())
}

/// Accept incoming bidirectional streams, one handler task per stream
async fn accept_streams(connection: Arc<Connection>, client: Arc<Client>, room: Arc<Room>) {
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                tokio::spawn(handle_stream(
                    send,
                    recv,
                    Arc::clone(&client),
                    Arc::clone(&room),
                ));
            }
            Err(e) => {
                debug!(client = client.id(), error = %e, "stopped accepting streams");
                return;
            }
        }
    }
}

/// Classify one stream by its first byte, then relay its frames
async fn handle_stream(
    mut send: SendStream,
    mut recv: RecvStream,
    client: Arc<Client>,
    room: Arc<Room>,
) {
    let type_byte = match recv.read_u8().await {
        Ok(byte) => byte,
        Err(e) => {
            debug!(client = client.id(), error = %e, "stream ended before classification");
            return;
        }
    };

    let channel = match Channel::from_u8(type_byte) {
        Some(channel) if channel.is_stream() => channel,
        _ => {
            // Unknown type: drop both halves, which closes the stream and
            // leaves the session running.
            warn!(
                client = client.id(),
                "unknown stream type 0x{:02x}, closing stream", type_byte
            );
            return;
        }
    };

    // The relay holds no document replica: answer a fresh text stream with
    // an empty sync step 2 so the client can finish its handshake. Written
    // before the handle is published, so egress cannot interleave with it.
    if channel == Channel::Text {
        if let Err(e) = send.write_all(&SYNC_STEP2).await {
            warn!(client = client.id(), error = %e, "failed to send initial sync");
            return;
        }
        debug!(client = client.id(), "sent initial sync step 2");
    }

    let classified = client.store_stream(channel, send).await;
    debug!(
        client = client.id(),
        ?channel,
        classified,
        "stream classified"
    );
    if classified == Channel::STREAM_COUNT {
        info!(client = client.id(), "all streams ready");
    }

    loop {
        match protocol::read_frame(&mut recv).await {
            Ok(Some(payload)) => {
                // Re-prefix with the channel byte so recipients can route
                // the frame to the matching stream on their side.
                let mut framed = BytesMut::with_capacity(1 + payload.len());
                framed.put_u8(channel as u8);
                framed.put_slice(&payload);
                room.broadcast(framed.freeze(), client.id()).await;
            }
            Ok(None) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(client = client.id(), ?channel, "stream closed by peer");
                return;
            }
            Err(e) => {
                warn!(client = client.id(), ?channel, error = %e, "stream read error");
                return;
            }
        }
    }
}

/// Receive datagrams: echo 8-byte pings, fan everything out to the room
async fn receive_datagrams(connection: Arc<Connection>, client: Arc<Client>, room: Arc<Room>) {
    loop {
        match connection.receive_datagram().await {
            Ok(datagram) => {
                let payload = datagram.payload();
                if payload.len() == PING_DATAGRAM_LEN {
                    if let Err(e) = connection.send_datagram(payload.clone()) {
                        debug!(client = client.id(), error = %e, "ping echo failed");
                    }
                }
                room.broadcast_datagram(&payload, client.id()).await;
            }
            Err(e) => {
                debug!(client = client.id(), error = %e, "datagram receive ended");
                return;
            }
        }
    }
}

/// Drain the outbound queue onto the wire.
///
/// Blocks until the streams-ready latch fires: frames written earlier
/// would land on unclassified stream slots and be lost.
async fn drain_outbound(
    connection: Arc<Connection>,
    client: Arc<Client>,
    mut outbound_rx: mpsc::Receiver<Bytes>,
) {
    tokio::select! {
        _ = client.streams_ready().cancelled() => {}
        _ = connection.closed() => return,
    }

    while let Some(frame) = outbound_rx.recv().await {
        if frame.is_empty() {
            continue;
        }

        let payload = frame.slice(1..);
        match Channel::from_u8(frame[0]) {
            Some(Channel::Awareness) => {
                if let Err(e) = connection.send_datagram(payload) {
                    warn!(client = client.id(), error = %e, "datagram write failed");
                    return;
                }
            }
            Some(channel) => {
                if payload.is_empty() || payload.len() > protocol::MAX_PAYLOAD_SIZE {
                    debug!(
                        client = client.id(),
                        len = payload.len(),
                        "dropping frame outside length bounds"
                    );
                    continue;
                }
                let mut streams = client.channels().lock().await;
                let Some(stream) = streams.stream_mut(channel) else {
                    continue;
                };
                if let Err(e) = protocol::write_frame(stream, &payload).await {
                    warn!(client = client.id(), ?channel, error = %e, "stream write failed");
                    return;
                }
            }
            None => {}
        }
    }
}

/// Extract the room id from a `/collab/...` connect path
fn room_id_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(COLLAB_PREFIX)?;
    let room = match rest {
        "" | "/" => DEFAULT_ROOM,
        _ => rest.strip_prefix('/')?,
    };
    Some(room.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::identity::ServerIdentity;
    use std::time::Duration;
    use tokio::time::timeout;
    use wtransport::ClientConfig;

    #[test]
    fn test_room_id_from_path() {
        assert_eq!(room_id_from_path("/collab/room1").as_deref(), Some("room1"));
        assert_eq!(room_id_from_path("/collab/").as_deref(), Some("default"));
        assert_eq!(room_id_from_path("/collab").as_deref(), Some("default"));
        assert_eq!(
            room_id_from_path("/collab/a/b").as_deref(),
            Some("a/b")
        );
        assert_eq!(room_id_from_path("/other"), None);
        assert_eq!(room_id_from_path("/collaborate"), None);
        assert_eq!(room_id_from_path("/"), None);
    }

    async fn start_server() -> (u16, Arc<CollaborationHub>) {
        let config = Config {
            cert_file: "/nonexistent/wt-test.pem".to_string(),
            key_file: "/nonexistent/wt-test.key".to_string(),
            ..Config::default()
        };
        let (identity, _hash) = ServerIdentity::load_or_generate(&config)
            .await
            .unwrap()
            .into_parts();

        let hub = Arc::new(CollaborationHub::new());
        let server = WebTransportServer::bind(0, identity, Arc::clone(&hub)).unwrap();
        let port = server.local_port().unwrap();
        tokio::spawn(server.serve());
        (port, hub)
    }

    async fn connect(port: u16, room: &str) -> Connection {
        let config = ClientConfig::builder()
            .with_bind_default()
            .with_no_cert_validation()
            .build();
        let endpoint = Endpoint::client(config).unwrap();
        endpoint
            .connect(format!("https://127.0.0.1:{}/collab/{}", port, room))
            .await
            .unwrap()
    }

    /// Open a channel stream from the client side and send its type byte
    async fn open_channel(
        connection: &Connection,
        channel: Channel,
    ) -> (SendStream, RecvStream) {
        let (mut send, recv) = connection.open_bi().await.unwrap().await.unwrap();
        send.write_all(&[channel as u8]).await.unwrap();
        (send, recv)
    }

    async fn wait_for_members(hub: &CollaborationHub, room: &str, expected: usize) {
        let room = hub.get_or_create_room(room).await;
        for _ in 0..500 {
            if room.member_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room never reached {} members", expected);
    }

    #[tokio::test]
    async fn test_text_stream_gets_sync_step2() {
        let (port, _hub) = start_server().await;
        let session = connect(port, "room2").await;

        let (_send, mut recv) = open_channel(&session, Channel::Text).await;

        let mut buf = [0u8; 5];
        timeout(Duration::from_secs(5), recv.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, SYNC_STEP2);
    }

    #[tokio::test]
    async fn test_formatting_frames_route_to_formatting_stream() {
        let (port, hub) = start_server().await;

        let session_a = connect(port, "room3").await;
        let session_b = connect(port, "room3").await;
        wait_for_members(&hub, "room3", 2).await;

        let (a_text, mut a_text_recv) = open_channel(&session_a, Channel::Text).await;
        let (mut a_fmt, _a_fmt_recv) = open_channel(&session_a, Channel::Formatting).await;
        let (a_struct, _a_struct_recv) = open_channel(&session_a, Channel::Structure).await;

        let (b_text, mut b_text_recv) = open_channel(&session_b, Channel::Text).await;
        let (_b_fmt, mut b_fmt_recv) = open_channel(&session_b, Channel::Formatting).await;
        let (_b_struct, mut b_struct_recv) = open_channel(&session_b, Channel::Structure).await;

        // Both clients finish the text handshake first.
        let mut sync = [0u8; 5];
        timeout(Duration::from_secs(5), a_text_recv.read_exact(&mut sync))
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(5), b_text_recv.read_exact(&mut sync))
            .await
            .unwrap()
            .unwrap();

        // A relays a formatting frame.
        protocol::write_frame(&mut a_fmt, &[0xFF, 0xEE]).await.unwrap();

        // B sees it on its formatting stream, length-framed.
        let payload = timeout(Duration::from_secs(5), protocol::read_frame(&mut b_fmt_recv))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&payload[..], &[0xFF, 0xEE]);

        // Nothing appears on B's text or structure streams.
        let mut one = [0u8; 1];
        assert!(
            timeout(Duration::from_millis(300), b_text_recv.read_exact(&mut one))
                .await
                .is_err()
        );
        assert!(
            timeout(Duration::from_millis(300), b_struct_recv.read_exact(&mut one))
                .await
                .is_err()
        );

        // Keep A's streams alive until the assertions are done.
        drop((a_text, a_struct, b_text));
    }

    #[tokio::test]
    async fn test_ping_datagram_echo_and_fanout() {
        let (port, hub) = start_server().await;

        let session_a = connect(port, "room4").await;
        let session_b = connect(port, "room4").await;
        wait_for_members(&hub, "room4", 2).await;

        let ping = [0u8, 0, 0, 0, 0, 0, 0, 0x2A];
        session_a.send_datagram(ping).unwrap();

        // A gets the echo back unmodified.
        let echo = timeout(Duration::from_secs(5), session_a.receive_datagram())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&echo.payload()[..], &ping);

        // B receives the fan-out copy.
        let copy = timeout(Duration::from_secs(5), session_b.receive_datagram())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&copy.payload()[..], &ping);
    }

    #[tokio::test]
    async fn test_unknown_stream_type_keeps_session_alive() {
        let (port, _hub) = start_server().await;
        let session = connect(port, "room6").await;

        let (mut bogus, _bogus_recv) = session.open_bi().await.unwrap().await.unwrap();
        bogus.write_all(&[0x09]).await.unwrap();

        // The session survives: a text stream opened afterwards still
        // completes the sync handshake.
        let (_send, mut recv) = open_channel(&session, Channel::Text).await;
        let mut buf = [0u8; 5];
        timeout(Duration::from_secs(5), recv.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, SYNC_STEP2);
    }
}
