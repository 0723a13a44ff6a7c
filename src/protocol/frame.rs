//! Length-prefixed binary framing
//!
//! Frame format on every reliable stream:
//! ```text
//! +----------------+------------------+
//! | length (2, BE) | payload          |
//! +----------------+------------------+
//! ```
//!
//! Valid payload lengths are 1..=65535. A zero length is a skip sentinel
//! on ingress and must never be emitted on egress. Datagrams carry their
//! payload raw, with no prefix. There are no checksums; a truncated read
//! terminates the stream.

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes
pub const LEN_PREFIX_SIZE: usize = 2;

/// Maximum payload size representable by the prefix
pub const MAX_PAYLOAD_SIZE: usize = 65535;

/// Read the next frame from a reliable stream.
///
/// Returns `Ok(Some(payload))` for a complete frame and `Ok(None)` for the
/// zero-length skip sentinel. End-of-stream surfaces as
/// `io::ErrorKind::UnexpectedEof`; a stream that ends cleanly does so at a
/// frame boundary, so callers treat that kind at the length position as a
/// normal close.
pub async fn read_frame<R>(stream: &mut R) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let len = stream.read_u16().await? as usize;
    if len == 0 {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Write one frame to a reliable stream
pub async fn write_frame<W>(stream: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload length {} outside 1..=65535", payload.len()),
        ));
    }

    stream
        .write_all(&(payload.len() as u16).to_be_bytes())
        .await?;
    stream.write_all(payload).await?;
    Ok(())
}
