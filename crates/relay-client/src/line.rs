//! Outbound line formatting.

use crate::ClientError;

/// Longest display name the client sends, in bytes.
pub const MAX_NAME_LEN: usize = 31;

/// Trim and cap a display name.
///
/// The cap falls back to the previous character boundary so multi-byte
/// characters are never split.
pub fn display_name(raw: &str) -> Result<String, ClientError> {
    let name = raw.trim();

    if name.contains(['\n', '\r']) {
        return Err(ClientError::EmbeddedNewline);
    }

    let mut end = name.len().min(MAX_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }

    let name = name[..end].trim_end();
    if name.is_empty() {
        return Err(ClientError::EmptyName);
    }

    Ok(name.to_string())
}

/// First line on a new connection.
pub fn join_line(display_name: &str) -> String {
    format!("JOIN {display_name}\n")
}

/// Terminate one line of user text.
pub fn chat_line(text: &str) -> Result<String, ClientError> {
    if text.contains(['\n', '\r']) {
        return Err(ClientError::EmbeddedNewline);
    }
    Ok(format!("{text}\n"))
}

/// How the user's own line is shown locally; the relay never echoes it.
pub fn local_echo(text: &str) -> String {
    format!("[You] {text}")
}
