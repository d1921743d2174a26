//! Broadcast fan-out.
//!
//! Formats relay output and turns one logical message into one
//! [`ServerAction::SendTo`] per recipient. Fan-out never fails as a whole:
//! whether a given recipient's write succeeds is the runtime's business, and a
//! failed write only tears down that recipient.
//!
//! Wire format:
//!
//! ```text
//! [<display_name>] <line>\n     relayed chat
//! [server] <notice>\n           join/leave notices, welcome banner
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    event::ServerAction,
    registry::{ConnectionId, ConnectionRegistry},
};

/// Tag used in place of a display name for relay-originated messages.
pub const SERVER_TAG: &str = "server";

/// `[<display_name>] <line>\n`, with `line` copied verbatim.
pub fn chat_line(display_name: &str, line: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(display_name.len() + line.len() + 4);
    out.put_u8(b'[');
    out.put_slice(display_name.as_bytes());
    out.put_slice(b"] ");
    out.put_slice(line);
    out.put_u8(b'\n');
    out.freeze()
}

/// `[server] <text>\n`
pub fn server_notice(text: &str) -> Bytes {
    chat_line(SERVER_TAG, text.as_bytes())
}

/// Notice sent to existing members when `display_name` joins.
pub fn join_notice(display_name: &str) -> Bytes {
    server_notice(&format!("{display_name} has joined the chat."))
}

/// Notice sent to remaining members when `display_name` leaves.
pub fn departure_notice(display_name: &str) -> Bytes {
    server_notice(&format!("{display_name} has left the chat."))
}

/// Queue `payload` for every member except `exclude`.
///
/// `exclude` is matched by handle only, so it may name a connection that has
/// already been removed. Returns the number of recipients.
pub fn fan_out(
    registry: &ConnectionRegistry,
    exclude: Option<ConnectionId>,
    payload: &Bytes,
    actions: &mut Vec<ServerAction>,
) -> usize {
    let mut recipients = 0;

    registry.for_each_member(exclude, |conn_id, _| {
        actions.push(ServerAction::SendTo { conn_id, payload: payload.clone() });
        recipients += 1;
    });

    recipients
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_members(names: &[&str]) -> ConnectionRegistry {
        let mut registry = ConnectionRegistry::new(8, 1023);
        for (i, name) in names.iter().enumerate() {
            let id = ConnectionId(i as u64 + 1);
            registry.add(id, None).unwrap();
            registry.mark_member(id, (*name).to_string()).unwrap();
        }
        registry
    }

    fn recipients(actions: &[ServerAction]) -> Vec<ConnectionId> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::SendTo { conn_id, .. } => Some(*conn_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn chat_line_wraps_payload() {
        assert_eq!(chat_line("alice", b"hi there"), Bytes::from_static(b"[alice] hi there\n"));
        assert_eq!(chat_line("bob", b""), Bytes::from_static(b"[bob] \n"));
    }

    #[test]
    fn chat_line_keeps_bytes_verbatim() {
        assert_eq!(chat_line("x", b"\xff\x00 raw"), Bytes::from_static(b"[x] \xff\x00 raw\n"));
    }

    #[test]
    fn notices_use_server_tag() {
        assert_eq!(join_notice("alice"), Bytes::from_static(b"[server] alice has joined the chat.\n"));
        assert_eq!(departure_notice("bob"), Bytes::from_static(b"[server] bob has left the chat.\n"));
    }

    #[test]
    fn fan_out_skips_sender() {
        let registry = registry_with_members(&["a", "b", "c"]);
        let mut actions = Vec::new();

        let count = fan_out(&registry, Some(ConnectionId(2)), &chat_line("b", b"yo"), &mut actions);

        assert_eq!(count, 2);
        assert_eq!(recipients(&actions), vec![ConnectionId(1), ConnectionId(3)]);
    }

    #[test]
    fn fan_out_skips_unauthenticated_connections() {
        let mut registry = registry_with_members(&["a"]);
        registry.add(ConnectionId(50), None).unwrap();
        let mut actions = Vec::new();

        fan_out(&registry, None, &server_notice("hello"), &mut actions);

        assert_eq!(recipients(&actions), vec![ConnectionId(1)]);
    }

    #[test]
    fn fan_out_with_departed_sender_reaches_everyone() {
        let mut registry = registry_with_members(&["a", "b"]);
        registry.remove(ConnectionId(2));
        let mut actions = Vec::new();

        let count = fan_out(&registry, Some(ConnectionId(2)), &departure_notice("b"), &mut actions);

        assert_eq!(count, 1);
        assert_eq!(actions, vec![ServerAction::SendTo {
            conn_id: ConnectionId(1),
            payload: Bytes::from_static(b"[server] b has left the chat.\n"),
        }]);
    }

    #[test]
    fn fan_out_to_empty_registry_is_noop() {
        let registry = ConnectionRegistry::new(4, 1023);
        let mut actions = Vec::new();

        assert_eq!(fan_out(&registry, None, &server_notice("anyone?"), &mut actions), 0);
        assert!(actions.is_empty());
    }
}
