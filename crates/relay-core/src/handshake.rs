//! Join handshake.
//!
//! A connection starts out unauthenticated. Its first logical line must be
//! `JOIN <name>`; anything else ends the connection. There is no retry and no
//! error reply, so the handshake needs no state beyond the
//! [`ConnectionState`](crate::ConnectionState) bit kept in the registry.
//!
//! ```text
//! ┌─────────────────┐  JOIN <name>   ┌────────┐
//! │ Unauthenticated │───────────────>│ Member │
//! └─────────────────┘                └────────┘
//!          │ anything else
//!          ↓
//!     (torn down)
//! ```

use thiserror::Error;

/// Prefix a first line must carry, including the separating space.
pub const JOIN_PREFIX: &[u8] = b"JOIN ";

/// Longest display name kept by default, in bytes. Longer names are
/// truncated silently.
pub const DEFAULT_MAX_NAME_LEN: usize = 63;

/// Reasons a first line fails the handshake.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// The line does not start with `JOIN `.
    #[error("first line is not a JOIN command")]
    MissingJoin,

    /// `JOIN` was followed by nothing but whitespace.
    #[error("JOIN carried an empty display name")]
    EmptyName,
}

/// Parse a `JOIN <name>` line and return the normalized display name.
///
/// The name is decoded as UTF-8 (invalid sequences are replaced), trimmed of
/// surrounding whitespace and truncated to at most `max_name_len` bytes on a
/// character boundary.
///
/// # Errors
///
/// - [`HandshakeError::MissingJoin`] if the line lacks the `JOIN ` prefix
/// - [`HandshakeError::EmptyName`] if nothing remains of the name
pub fn parse_join(line: &[u8], max_name_len: usize) -> Result<String, HandshakeError> {
    let rest = line.strip_prefix(JOIN_PREFIX).ok_or(HandshakeError::MissingJoin)?;

    let decoded = String::from_utf8_lossy(rest);
    let name = truncate_to_boundary(decoded.trim(), max_name_len).trim_end();

    if name.is_empty() {
        return Err(HandshakeError::EmptyName);
    }

    Ok(name.to_owned())
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }

    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
