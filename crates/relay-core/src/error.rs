//! Error types for the relay core.
//!
//! Every per-connection failure ends in the same place: the connection is torn
//! down with a [`CloseReason`]. None of them are fatal to the relay.

use thiserror::Error;

use crate::{framer::FramingError, handshake::HandshakeError, registry::RegistryError};

/// Ways a client can break the line protocol.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// First line was not `JOIN <name>`
    #[error("first line was not a JOIN")]
    MissingJoin,

    /// `JOIN` without a usable display name
    #[error("JOIN carried an empty display name")]
    EmptyName,

    /// Line exceeded the configured maximum before its terminator
    #[error("line exceeds {max} bytes")]
    LineTooLong {
        /// Configured maximum line length
        max: usize,
    },
}

impl From<HandshakeError> for ProtocolViolation {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::MissingJoin => Self::MissingJoin,
            HandshakeError::EmptyName => Self::EmptyName,
        }
    }
}

impl From<FramingError> for ProtocolViolation {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::LineTooLong { max } => Self::LineTooLong { max },
        }
    }
}

/// Why a connection was torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly close by the peer (zero-byte read)
    #[error("peer closed the connection")]
    PeerClosed,

    /// Accept, read or write failure on the socket
    #[error("transport error: {0}")]
    Transport(String),

    /// Registry was full when the connection arrived
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// Client broke the line protocol
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Relay is shutting down
    #[error("server shutting down")]
    Shutdown,
}

/// Errors returned by [`RelayDriver::process_event`](crate::RelayDriver::process_event).
///
/// These indicate a runtime feeding inconsistent events (e.g. announcing the
/// same connection twice), not misbehaving clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Registry rejected an operation
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionId;

    #[test]
    fn close_reason_display() {
        assert_eq!(CloseReason::PeerClosed.to_string(), "peer closed the connection");
        assert_eq!(
            CloseReason::Transport("broken pipe".to_string()).to_string(),
            "transport error: broken pipe"
        );
        assert_eq!(
            CloseReason::from(ProtocolViolation::LineTooLong { max: 1023 }).to_string(),
            "protocol violation: line exceeds 1023 bytes"
        );
    }

    #[test]
    fn handshake_errors_map_to_violations() {
        assert_eq!(
            ProtocolViolation::from(HandshakeError::MissingJoin),
            ProtocolViolation::MissingJoin
        );
        assert_eq!(ProtocolViolation::from(HandshakeError::EmptyName), ProtocolViolation::EmptyName);
        assert_eq!(
            ProtocolViolation::from(FramingError::LineTooLong { max: 7 }),
            ProtocolViolation::LineTooLong { max: 7 }
        );
    }

    #[test]
    fn driver_error_display() {
        let err = DriverError::from(RegistryError::Duplicate(ConnectionId(9)));
        assert_eq!(err.to_string(), "registry error: connection conn#9 already registered");
    }
}
