//! Server error types.

use std::fmt;

use relay_core::DriverError;

/// Errors that can stop the server.
///
/// Per-connection failures never show up here; they tear down the one
/// connection and the loop carries on.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, zero-sized limits, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport error (bind failure, poll failure, etc.).
    ///
    /// Raised by the listener or the poller, never by a single connection.
    Transport(String),

    /// Driver error (from `RelayDriver` processing).
    ///
    /// The runtime fed the driver inconsistent events. Indicates a bug.
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
