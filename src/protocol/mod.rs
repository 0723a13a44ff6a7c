//! Wire protocol for the collaboration relay
//!
//! This module provides:
//! - The 2-byte big-endian length-prefix framing shared by all reliable streams
//! - Logical channel identifiers carried as stream-type bytes
//! - The fixed initial sync response for text streams

pub mod channel;
pub mod frame;

// Re-export commonly used items
pub use channel::{Channel, SYNC_STEP2};
pub use frame::{LEN_PREFIX_SIZE, MAX_PAYLOAD_SIZE, read_frame, write_frame};
