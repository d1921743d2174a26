//! Fuzz target for RelayDriver event sequences
//!
//! Prevent registry corruption under hostile connect/disconnect/data
//! interleavings (HIGH priority)
//!
//! # Strategy
//!
//! - Accepts, byte chunks and closes for a small pool of connection ids
//! - Chunks are arbitrary bytes or well-formed JOIN/chat lines
//! - Duplicate accepts and events for unknown connections
//!
//! # Invariants
//!
//! - Registered connections never exceed `max_clients`
//! - `SendTo` only targets joined members
//! - A chat line is never sent back to its sender
//! - Closing twice produces no actions the second time
//! - NEVER panic

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use relay_core::{
    CloseReason, ConnectionId, RelayConfig, RelayDriver, ServerAction, ServerEvent,
};

#[derive(Debug, Clone, Arbitrary)]
struct DriverScenario {
    max_clients: u8,
    events: Vec<FuzzEvent>,
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Accept(u8),
    Join { conn: u8, name: Vec<u8> },
    Chat { conn: u8, text: Vec<u8> },
    Raw { conn: u8, bytes: Vec<u8> },
    Close(u8),
}

fuzz_target!(|scenario: DriverScenario| {
    let max_clients = (scenario.max_clients % 8) as usize;
    let mut driver = RelayDriver::new(RelayConfig {
        max_clients,
        max_line_len: 64,
        max_name_len: 16,
        ..Default::default()
    });
    let mut accepted: HashSet<u8> = HashSet::new();

    for event in scenario.events {
        let (conn, server_event) = match event {
            FuzzEvent::Accept(conn) => {
                // Runtime never reuses an id while it is registered
                if !accepted.insert(conn) {
                    continue;
                }
                (conn, ServerEvent::ConnectionAccepted { conn_id: ConnectionId(conn.into()), peer_addr: None })
            },
            FuzzEvent::Join { conn, name } => {
                let mut data = b"JOIN ".to_vec();
                data.extend(name.into_iter().filter(|b| *b != b'\n'));
                data.push(b'\n');
                (conn, bytes_event(conn, data))
            },
            FuzzEvent::Chat { conn, text } => {
                let mut data: Vec<u8> = text.into_iter().filter(|b| *b != b'\n').collect();
                data.push(b'\n');
                (conn, bytes_event(conn, data))
            },
            FuzzEvent::Raw { conn, bytes } => (conn, bytes_event(conn, bytes)),
            FuzzEvent::Close(conn) => {
                let close = || ServerEvent::ConnectionClosed {
                    conn_id: ConnectionId(conn.into()),
                    reason: CloseReason::PeerClosed,
                };
                let _ = driver.process_event(close());
                let again = driver.process_event(close()).expect("close never errors");
                assert!(again.is_empty(), "second close produced actions");
                accepted.remove(&conn);
                continue;
            },
        };

        let members_before: HashSet<ConnectionId> =
            driver.registry().members(None).map(|(id, _)| id).collect();
        let is_chat = driver.registry().get(ConnectionId(conn.into())).is_some_and(|c| c.is_member());

        let actions = driver.process_event(server_event).expect("no duplicate accepts are fed");

        assert!(driver.connection_count() <= max_clients, "registry over capacity");

        for action in &actions {
            if let ServerAction::SendTo { conn_id, .. } = action {
                let member_now = driver.registry().get(*conn_id).is_some_and(|c| c.is_member());
                assert!(member_now || members_before.contains(conn_id), "SendTo a non-member");
                if is_chat {
                    assert_ne!(*conn_id, ConnectionId(conn.into()), "chat echoed to sender");
                }
            }
        }

        // Torn down connections may be accepted again under the same id
        if !driver.registry().contains(ConnectionId(conn.into())) {
            accepted.remove(&conn);
        }
    }
});

fn bytes_event(conn: u8, data: Vec<u8>) -> ServerEvent {
    ServerEvent::BytesReceived { conn_id: ConnectionId(conn.into()), data: Bytes::from(data) }
}
