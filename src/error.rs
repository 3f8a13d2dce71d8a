//! Error kinds that terminate a dump session.
//!
//! Every variant is terminal: the session closes its subscription before the
//! error is surfaced, and only the first error of a session is kept.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DumpError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DumpError {
    /// The transport delivered nothing (connection lost).
    #[error("nil message in dump")]
    NilMessage,

    /// The transport delivered a payload that is not a dump protocol message.
    #[error("invalid message in dump: {0}")]
    InvalidMessage(String),

    /// Fault reported by the transport, kept verbatim.
    #[error("{0}")]
    Transport(String),

    /// The dump operation itself answered with a non-200 status.
    #[error("{name}: {message}")]
    Engine {
        status_code: i64,
        name: String,
        message: String,
    },

    /// The caller-supplied command sink refused a command.
    #[error("failed to emit command: {0}")]
    Sink(String),
}

impl DumpError {
    /// True for errors caused by the peer breaking the dump protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, DumpError::NilMessage | DumpError::InvalidMessage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_message() {
        let err = DumpError::Engine {
            status_code: 500,
            name: "Error".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Error: boom");
    }

    #[test]
    fn test_transport_error_passes_text_through() {
        let err = DumpError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
        assert!(!err.is_protocol_violation());
    }

    #[test]
    fn test_protocol_violations() {
        assert_eq!(DumpError::NilMessage.to_string(), "nil message in dump");
        assert!(DumpError::NilMessage.is_protocol_violation());
        assert!(DumpError::InvalidMessage("42".into()).is_protocol_violation());
    }
}
