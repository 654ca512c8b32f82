//! Error types for pine-client.

use thiserror::Error;

use crate::protocol::ResultCode;

/// Main error type for all PINE operations.
#[derive(Debug, Error)]
pub enum PineError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Length prefix missing, out of range, or body shorter than declared.
    #[error("Framing error: {0}")]
    Framing(String),

    /// The connection failed while this call was outstanding.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection closed or engine shut down.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A reply arrived with no outstanding request.
    #[error("Protocol desynchronized: answer received with no pending call")]
    ProtocolDesync,

    /// The emulator answered with a non-OK result code.
    #[error("Emulator returned {0:?}")]
    Result(ResultCode),

    /// In-flight limit did not clear before the timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Request refused locally; its answer could never be accepted.
    #[error("Request too large: {0}")]
    RequestTooLarge(String),

    /// OK answer whose argument does not match the command's reply shape.
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl PineError {
    /// Copy of this error suitable for handing to every pending call when
    /// the connection dies.
    ///
    /// `io::Error` is not `Clone`, so I/O failures are carried as text.
    pub(crate) fn fan_out(&self) -> PineError {
        match self {
            PineError::Framing(msg) => PineError::Framing(msg.clone()),
            PineError::Connection(msg) => PineError::Connection(msg.clone()),
            PineError::ProtocolDesync => PineError::ProtocolDesync,
            PineError::Io(e) => PineError::Connection(e.to_string()),
            _ => PineError::ConnectionClosed,
        }
    }

    /// Whether this error means the connection is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PineError::Io(_)
                | PineError::Framing(_)
                | PineError::Connection(_)
                | PineError::ConnectionClosed
                | PineError::ProtocolDesync
        )
    }
}

/// Result type alias using PineError.
pub type Result<T> = std::result::Result<T, PineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_preserves_kind() {
        let framing = PineError::Framing("short body".to_string());
        assert!(matches!(framing.fan_out(), PineError::Framing(m) if m == "short body"));

        let io = PineError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        match io.fan_out() {
            PineError::Connection(msg) => assert!(msg.contains("reset by peer")),
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            PineError::ProtocolDesync.fan_out(),
            PineError::ProtocolDesync
        ));
        assert!(matches!(
            PineError::BackpressureTimeout.fan_out(),
            PineError::ConnectionClosed
        ));
    }

    #[test]
    fn test_result_failure_is_not_fatal() {
        assert!(!PineError::Result(ResultCode::OutOfMemory).is_fatal());
        assert!(!PineError::RequestTooLarge("read of 1 MiB".to_string()).is_fatal());
        assert!(PineError::ConnectionClosed.is_fatal());
    }
}
