//! TCP transport.
//!
//! Owns every connection socket and its registration with the poller. Sockets
//! are non-blocking: reads drain until `WouldBlock`, and a write that cannot
//! complete immediately counts as a failed delivery.

use std::{
    collections::HashMap,
    io::{self, Read, Write},
    net::Shutdown,
};

use mio::{Interest, Registry, Token, net::TcpStream};
use relay_core::ConnectionId;

use crate::executor::Outbound;

/// Tokens below this value are reserved for the listener and the waker.
pub(crate) const FIRST_CONNECTION_TOKEN: usize = 2;

/// Poll token for a connection.
pub(crate) fn token_for(conn_id: ConnectionId) -> Token {
    Token(FIRST_CONNECTION_TOKEN + conn_id.0 as usize)
}

/// Connection for a poll token, if the token belongs to one.
pub(crate) fn connection_for(token: Token) -> Option<ConnectionId> {
    token.0.checked_sub(FIRST_CONNECTION_TOKEN).map(|n| ConnectionId(n as u64))
}

/// Result of a single non-blocking read.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer
    Data(usize),
    /// Nothing more to read for now
    WouldBlock,
    /// Peer closed its side (zero-byte read)
    Closed,
    /// Read failed
    Failed(io::Error),
    /// No such connection
    Gone,
}

/// Live connection sockets, keyed by connection.
pub struct ConnectionTable {
    /// Sockets of live connections
    streams: HashMap<ConnectionId, TcpStream>,
    /// Poller registration handle
    registry: Registry,
}

impl ConnectionTable {
    /// Create an empty table that registers sockets with `registry`.
    pub fn new(registry: Registry) -> Self {
        Self { streams: HashMap::new(), registry }
    }

    /// Register a freshly accepted socket for readability.
    pub fn insert(&mut self, conn_id: ConnectionId, mut stream: TcpStream) -> io::Result<()> {
        self.registry.register(&mut stream, token_for(conn_id), Interest::READABLE)?;
        self.streams.insert(conn_id, stream);
        Ok(())
    }

    /// Read once into `buf`.
    pub fn read(&mut self, conn_id: ConnectionId, buf: &mut [u8]) -> ReadOutcome {
        let Some(stream) = self.streams.get_mut(&conn_id) else {
            return ReadOutcome::Gone;
        };

        loop {
            match stream.read(buf) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => return ReadOutcome::Data(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::WouldBlock,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }

    /// Pending socket error, used when the poller reports error readiness.
    pub fn take_error(&self, conn_id: ConnectionId) -> Option<io::Error> {
        let stream = self.streams.get(&conn_id)?;
        match stream.take_error() {
            Ok(pending) => pending,
            Err(e) => Some(e),
        }
    }

    /// Check if a connection socket is still open.
    pub fn contains(&self, conn_id: ConnectionId) -> bool {
        self.streams.contains_key(&conn_id)
    }

    /// Number of open sockets.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// No sockets are open.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Outbound for ConnectionTable {
    fn send(&mut self, conn_id: ConnectionId, payload: &[u8]) -> io::Result<()> {
        let stream = self.streams.get_mut(&conn_id).ok_or(io::ErrorKind::NotConnected)?;

        let mut written = 0;
        while written < payload.len() {
            match stream.write(&payload[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn close(&mut self, conn_id: ConnectionId) {
        let Some(mut stream) = self.streams.remove(&conn_id) else {
            return;
        };

        if let Err(e) = self.registry.deregister(&mut stream) {
            tracing::debug!("deregister failed for {}: {}", conn_id, e);
        }
        // Peer may already be gone
        let _ = stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_past_reserved_range() {
        assert_eq!(token_for(ConnectionId(0)), Token(2));
        assert_eq!(connection_for(Token(2)), Some(ConnectionId(0)));
        assert_eq!(connection_for(token_for(ConnectionId(77))), Some(ConnectionId(77)));
    }

    #[test]
    fn reserved_tokens_are_not_connections() {
        assert_eq!(connection_for(Token(0)), None);
        assert_eq!(connection_for(Token(1)), None);
    }
}
