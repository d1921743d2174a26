//! Action executor.
//!
//! Carries out the [`ServerAction`]s returned by [`RelayDriver`]. Writes that
//! fail are not retried: the recipient is fed back to the driver as a
//! transport close once the batch is done, and whatever that teardown
//! produces (departure notices, more failures) is executed the same way.

use std::io;

use relay_core::{CloseReason, ConnectionId, LogLevel, RelayDriver, ServerAction, ServerEvent};

use crate::ServerError;

/// Socket side of the executor.
pub trait Outbound {
    /// Write `payload` to a connection in full.
    ///
    /// Anything short of a complete write is an error. `NotConnected` means the
    /// connection is already gone.
    fn send(&mut self, conn_id: ConnectionId, payload: &[u8]) -> io::Result<()>;

    /// Close a connection's socket. Closing an unknown connection is a no-op.
    fn close(&mut self, conn_id: ConnectionId);
}

/// Execute a batch of driver actions, then tear down failed recipients.
pub fn execute_actions<O: Outbound>(
    driver: &mut RelayDriver,
    actions: Vec<ServerAction>,
    outbound: &mut O,
) -> Result<(), ServerError> {
    let mut actions = actions;

    loop {
        let failed = execute_batch(actions, outbound);
        if failed.is_empty() {
            return Ok(());
        }

        actions = Vec::new();
        for (conn_id, reason) in failed {
            actions.extend(driver.process_event(ServerEvent::ConnectionClosed { conn_id, reason })?);
        }
    }
}

/// Run one batch. Returns the connections whose writes failed, first failure
/// only.
fn execute_batch<O: Outbound>(
    actions: Vec<ServerAction>,
    outbound: &mut O,
) -> Vec<(ConnectionId, CloseReason)> {
    let mut failed: Vec<(ConnectionId, CloseReason)> = Vec::new();

    for action in actions {
        match action {
            ServerAction::SendTo { conn_id, payload } => {
                if failed.iter().any(|(id, _)| *id == conn_id) {
                    continue;
                }

                match outbound.send(conn_id, &payload) {
                    Ok(()) => {},
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                        tracing::debug!("SendTo: {} not connected", conn_id);
                    },
                    Err(e) => {
                        tracing::warn!("SendTo write failed for {}: {}", conn_id, e);
                        failed.push((conn_id, CloseReason::Transport(e.to_string())));
                    },
                }
            },

            ServerAction::Close { conn_id, reason } => {
                tracing::debug!("Closing {}: {}", conn_id, reason);
                outbound.close(conn_id);
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
        }
    }

    failed
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use bytes::Bytes;
    use relay_core::RelayConfig;

    use super::*;

    /// In-memory sockets; ids in `broken` fail every write.
    #[derive(Default)]
    struct MockOutbound {
        open: HashSet<ConnectionId>,
        broken: HashSet<ConnectionId>,
        written: HashMap<ConnectionId, Vec<u8>>,
        closed: Vec<ConnectionId>,
    }

    impl MockOutbound {
        fn text(&self, id: u64) -> String {
            String::from_utf8_lossy(self.written.get(&ConnectionId(id)).map_or(&[][..], |v| v))
                .into_owned()
        }
    }

    impl Outbound for MockOutbound {
        fn send(&mut self, conn_id: ConnectionId, payload: &[u8]) -> io::Result<()> {
            if !self.open.contains(&conn_id) {
                return Err(io::ErrorKind::NotConnected.into());
            }
            if self.broken.contains(&conn_id) {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.written.entry(conn_id).or_default().extend_from_slice(payload);
            Ok(())
        }

        fn close(&mut self, conn_id: ConnectionId) {
            self.open.remove(&conn_id);
            self.closed.push(conn_id);
        }
    }

    fn run(driver: &mut RelayDriver, out: &mut MockOutbound, event: ServerEvent) {
        let actions = driver.process_event(event).unwrap();
        execute_actions(driver, actions, out).unwrap();
    }

    fn connect(driver: &mut RelayDriver, out: &mut MockOutbound, id: u64, name: &str) {
        out.open.insert(ConnectionId(id));
        run(driver, out, ServerEvent::ConnectionAccepted { conn_id: ConnectionId(id), peer_addr: None });
        run(driver, out, ServerEvent::BytesReceived {
            conn_id: ConnectionId(id),
            data: Bytes::from(format!("JOIN {name}\n")),
        });
    }

    #[test]
    fn sends_are_written_in_order() {
        let mut driver = RelayDriver::new(RelayConfig::default());
        let mut out = MockOutbound::default();

        connect(&mut driver, &mut out, 1, "alice");
        connect(&mut driver, &mut out, 2, "bob");
        run(&mut driver, &mut out, ServerEvent::BytesReceived {
            conn_id: ConnectionId(2),
            data: Bytes::from_static(b"one\ntwo\n"),
        });

        assert_eq!(
            out.text(1),
            "[server] Welcome!\n[server] bob has joined the chat.\n[bob] one\n[bob] two\n"
        );
        assert_eq!(out.text(2), "[server] Welcome!\n");
    }

    #[test]
    fn failed_recipient_is_torn_down_and_others_still_served() {
        let mut driver = RelayDriver::new(RelayConfig::default());
        let mut out = MockOutbound::default();

        connect(&mut driver, &mut out, 1, "alice");
        connect(&mut driver, &mut out, 2, "bob");
        connect(&mut driver, &mut out, 3, "carol");
        out.broken.insert(ConnectionId(2));

        run(&mut driver, &mut out, ServerEvent::BytesReceived {
            conn_id: ConnectionId(1),
            data: Bytes::from_static(b"hi\n"),
        });

        assert!(out.text(3).ends_with("[alice] hi\n[server] bob has left the chat.\n"));
        assert!(out.text(1).ends_with("[server] bob has left the chat.\n"));
        assert_eq!(out.closed, vec![ConnectionId(2)]);
        assert_eq!(driver.roster(), vec!["alice", "carol"]);
    }

    #[test]
    fn cascading_failures_settle() {
        let mut driver = RelayDriver::new(RelayConfig::default());
        let mut out = MockOutbound::default();

        connect(&mut driver, &mut out, 1, "alice");
        connect(&mut driver, &mut out, 2, "bob");
        connect(&mut driver, &mut out, 3, "carol");
        out.broken.insert(ConnectionId(2));
        out.broken.insert(ConnectionId(3));

        run(&mut driver, &mut out, ServerEvent::BytesReceived {
            conn_id: ConnectionId(1),
            data: Bytes::from_static(b"anyone?\n"),
        });

        assert_eq!(driver.roster(), vec!["alice"]);
        assert_eq!(out.closed.len(), 2);
        assert!(out.text(1).ends_with("[server] carol has left the chat.\n"));
    }

    #[test]
    fn send_to_closed_connection_is_ignored() {
        let mut driver = RelayDriver::new(RelayConfig::default());
        let mut out = MockOutbound::default();

        let actions = vec![ServerAction::SendTo {
            conn_id: ConnectionId(42),
            payload: Bytes::from_static(b"[server] hello\n"),
        }];

        execute_actions(&mut driver, actions, &mut out).unwrap();

        assert!(out.written.is_empty());
        assert!(out.closed.is_empty());
    }

    #[test]
    fn capacity_rejection_closes_socket() {
        let mut driver = RelayDriver::new(RelayConfig { max_clients: 1, ..Default::default() });
        let mut out = MockOutbound::default();

        connect(&mut driver, &mut out, 1, "alice");
        out.open.insert(ConnectionId(2));
        run(&mut driver, &mut out, ServerEvent::ConnectionAccepted {
            conn_id: ConnectionId(2),
            peer_addr: None,
        });

        assert_eq!(out.closed, vec![ConnectionId(2)]);
        assert_eq!(out.text(2), "");
        assert_eq!(driver.connection_count(), 1);
    }
}
