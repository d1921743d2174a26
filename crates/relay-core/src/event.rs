//! Driver events and actions.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::{error::CloseReason, registry::ConnectionId};

/// Events that the relay driver processes.
///
/// These are produced by the runtime that owns the sockets.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Handle assigned by the runtime
        conn_id: ConnectionId,
        /// Remote address, when known
        peer_addr: Option<SocketAddr>,
    },

    /// Bytes were read from a connection
    BytesReceived {
        /// Connection that sent the bytes
        conn_id: ConnectionId,
        /// Raw bytes, in arrival order, with arbitrary chunk boundaries
        data: Bytes,
    },

    /// A connection ended (peer close, I/O error, failed delivery)
    ConnectionClosed {
        /// Connection that ended
        conn_id: ConnectionId,
        /// Why it ended
        reason: CloseReason,
    },
}

/// Actions that the relay driver produces.
///
/// The runtime executes them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Write a payload to one connection
    SendTo {
        /// Recipient
        conn_id: ConnectionId,
        /// Complete wire bytes, terminator included
        payload: Bytes,
    },

    /// Close a connection's socket
    Close {
        /// Connection to close
        conn_id: ConnectionId,
        /// Reason for closure
        reason: CloseReason,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

impl ServerAction {
    pub(crate) fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log { level, message: message.into() }
    }
}

/// Log levels for driver actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
}
