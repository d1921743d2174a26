//! Client errors.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Display name is empty after trimming.
    #[error("display name is empty")]
    EmptyName,

    /// Outbound text would split into more than one line.
    #[error("text contains a line break")]
    EmbeddedNewline,

    /// Could not reach the relay.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection task has stopped.
    #[error("connection closed")]
    Closed,
}
