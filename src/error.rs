//! Error handling for the collaboration relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Clone)]
pub enum RelayError {
    /// Network-related errors (reads, writes, binds)
    Network(String),
    /// Session or stream lifecycle errors
    Connection(String),
    /// Wire protocol violations
    Protocol(String),
    /// Malformed frame (bad length prefix, truncated payload)
    InvalidFrame(String),
    /// Configuration or startup error
    Config(String),
    /// Server internal error
    Internal(String),
}

impl RelayError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            RelayError::Network(_) => 1000,
            RelayError::Connection(_) => 1001,
            RelayError::Protocol(_) => 1002,
            RelayError::InvalidFrame(_) => 1003,
            RelayError::Config(_) => 1004,
            RelayError::Internal(_) => 1005,
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            RelayError::Network(msg)
            | RelayError::Connection(msg)
            | RelayError::Protocol(msg)
            | RelayError::InvalidFrame(msg)
            | RelayError::Config(msg)
            | RelayError::Internal(msg) => msg,
        }
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        RelayError::Network(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        RelayError::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        RelayError::Protocol(msg.into())
    }

    /// Create an invalid frame error
    pub fn invalid_frame<T: Into<String>>(msg: T) -> Self {
        RelayError::InvalidFrame(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        RelayError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        RelayError::Internal(msg.into())
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Network(msg) => write!(f, "Network error: {}", msg),
            RelayError::Connection(msg) => write!(f, "Connection error: {}", msg),
            RelayError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            RelayError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RelayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Network(format!("IO error: {}", err))
    }
}

impl From<wtransport::error::ConnectionError> for RelayError {
    fn from(err: wtransport::error::ConnectionError) -> Self {
        RelayError::Connection(format!("session error: {}", err))
    }
}

impl From<wtransport::error::StreamWriteError> for RelayError {
    fn from(err: wtransport::error::StreamWriteError) -> Self {
        RelayError::Network(format!("stream write error: {}", err))
    }
}

impl From<wtransport::error::SendDatagramError> for RelayError {
    fn from(err: wtransport::error::SendDatagramError) -> Self {
        RelayError::Network(format!("datagram send error: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Protocol(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_distinct() {
        let errors = [
            RelayError::network("a"),
            RelayError::connection("b"),
            RelayError::protocol("c"),
            RelayError::invalid_frame("d"),
            RelayError::config("e"),
            RelayError::internal("f"),
        ];

        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_includes_message() {
        let err = RelayError::protocol("unexpected stream type");
        assert!(err.to_string().contains("unexpected stream type"));
        assert_eq!(err.message(), "unexpected stream type");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Network(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RelayError = json.into();
        assert!(matches!(err, RelayError::Protocol(_)));
    }
}
