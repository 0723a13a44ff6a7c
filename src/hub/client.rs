//! Per-connection client state
//!
//! A `Client` is created when a transport adapter accepts a connection and
//! lives until that session ends. The room only ever holds a shared
//! reference; the adapter that created the client owns it and the receiving
//! half of its outbound queue.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wtransport::SendStream;

use crate::protocol::Channel;

/// Capacity of each client's outbound frame queue
pub const OUTBOUND_BUFFER: usize = 256;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Transport a client connected over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    WebSocket,
    WebTransport,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::WebSocket => write!(f, "websocket"),
            Transport::WebTransport => write!(f, "webtransport"),
        }
    }
}

/// Datagram send hook registered by the session adapter
pub type DatagramSender = Box<dyn Fn(Bytes) + Send + Sync>;

/// Reliable stream handles keyed by logical channel.
///
/// Generic over the stream type so classification bookkeeping is testable
/// without a live QUIC session.
pub struct ChannelStreams<S = SendStream> {
    text: Option<S>,
    formatting: Option<S>,
    structure: Option<S>,
    classified: u8,
}

impl<S> Default for ChannelStreams<S> {
    fn default() -> Self {
        Self {
            text: None,
            formatting: None,
            structure: None,
            classified: 0,
        }
    }
}

impl<S> ChannelStreams<S> {
    /// Store a stream handle under its channel slot.
    ///
    /// Returns the classification count after the insert. Only the first
    /// stream of each channel advances the count; a duplicate replaces the
    /// stored handle without counting again. `Awareness` has no slot.
    pub fn insert(&mut self, channel: Channel, stream: S) -> u8 {
        let slot = match channel {
            Channel::Text => &mut self.text,
            Channel::Formatting => &mut self.formatting,
            Channel::Structure => &mut self.structure,
            Channel::Awareness => return self.classified,
        };

        if slot.is_none() {
            self.classified += 1;
        }
        *slot = Some(stream);
        self.classified
    }

    /// Get the stream handle for a reliable channel, if classified
    pub fn stream_mut(&mut self, channel: Channel) -> Option<&mut S> {
        match channel {
            Channel::Text => self.text.as_mut(),
            Channel::Formatting => self.formatting.as_mut(),
            Channel::Structure => self.structure.as_mut(),
            Channel::Awareness => None,
        }
    }

    /// Number of distinct reliable channels classified so far
    pub fn classified(&self) -> u8 {
        self.classified
    }
}

/// One connected endpoint
pub struct Client {
    id: u64,
    transport: Transport,
    outbound_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    channels: tokio::sync::Mutex<ChannelStreams>,
    datagram_tx: OnceLock<DatagramSender>,
    streams_ready: CancellationToken,
}

impl Client {
    /// Create a client with a fresh process-wide id and its outbound queue.
    ///
    /// The receiving half is returned to the adapter, which drains it to
    /// the wire. The sending half stays with the client and is taken (and
    /// thereby closed) exactly once, by the room on unregister.
    pub fn new(transport: Transport) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        let client = Arc::new(Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            outbound_tx: Mutex::new(Some(outbound_tx)),
            channels: tokio::sync::Mutex::new(ChannelStreams::default()),
            datagram_tx: OnceLock::new(),
            streams_ready: CancellationToken::new(),
        });

        (client, outbound_rx)
    }

    /// Process-wide monotonic client id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Transport this client connected over
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Attempt a non-blocking enqueue onto the outbound queue.
    ///
    /// Returns false when the queue is full or already closed; the frame is
    /// dropped for this recipient in both cases.
    pub fn try_enqueue(&self, frame: Bytes) -> bool {
        let guard = self.outbound_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Close the outbound queue.
    ///
    /// Called by the room loop after removing the client from the
    /// membership set. Returns false if the queue was already closed.
    pub fn close_outbound(&self) -> bool {
        self.outbound_tx.lock().unwrap().take().is_some()
    }

    /// Store a classified stream handle on this client.
    ///
    /// Fires the streams-ready latch once all reliable channels have been
    /// seen. Returns the classification count for logging.
    pub async fn store_stream(&self, channel: Channel, stream: SendStream) -> u8 {
        let mut channels = self.channels.lock().await;
        let classified = channels.insert(channel, stream);
        if classified == Channel::STREAM_COUNT {
            self.streams_ready.cancel();
        }
        classified
    }

    /// Access the stream handles for egress dispatch
    pub fn channels(&self) -> &tokio::sync::Mutex<ChannelStreams> {
        &self.channels
    }

    /// Latch closed once all reliable channels are classified
    pub fn streams_ready(&self) -> &CancellationToken {
        &self.streams_ready
    }

    /// Attach the datagram send hook. Only the first call takes effect.
    pub fn set_datagram_sender(&self, sender: DatagramSender) {
        let _ = self.datagram_tx.set(sender);
    }

    /// Send a datagram to this client, if the transport supports them
    pub fn send_datagram(&self, payload: Bytes) {
        if let Some(send) = self.datagram_tx.get() {
            send(payload);
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .finish()
    }
}
