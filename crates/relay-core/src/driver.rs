//! Relay driver.
//!
//! Ties together the connection registry, per-connection line framing, the
//! join handshake and broadcast fan-out. The driver is the registry's only
//! owner; runtimes talk to it exclusively through [`ServerEvent`]s and execute
//! the [`ServerAction`]s it hands back.
//!
//! Each call to [`RelayDriver::process_event`] runs to completion, so all
//! actions produced for an event are visible to the runtime before the next
//! event is processed. Teardown removes the connection from the registry
//! inside that same call, which is why a member torn down earlier in a
//! dispatch round is never a recipient later in the round.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::{
    broadcast,
    config::RelayConfig,
    error::{CloseReason, DriverError, ProtocolViolation},
    event::{LogLevel, ServerAction, ServerEvent},
    handshake,
    registry::{ConnectionId, ConnectionRegistry, ConnectionState},
};

/// Action-based relay driver.
#[derive(Debug)]
pub struct RelayDriver {
    /// Live connections
    registry: ConnectionRegistry,
    /// Relay configuration
    config: RelayConfig,
}

impl RelayDriver {
    /// Create a new driver with an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        Self { registry: ConnectionRegistry::new(config.max_clients, config.max_line_len), config }
    }

    /// Process a relay event and return actions to execute.
    ///
    /// This is the main entry point for the driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { conn_id, peer_addr } => {
                self.handle_connection_accepted(conn_id, peer_addr)
            },
            ServerEvent::BytesReceived { conn_id, data } => {
                self.handle_bytes_received(conn_id, &data)
            },
            ServerEvent::ConnectionClosed { conn_id, reason } => {
                Ok(self.teardown(conn_id, reason))
            },
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        conn_id: ConnectionId,
        peer_addr: Option<SocketAddr>,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.registry.is_full() {
            return Ok(vec![
                ServerAction::log(
                    LogLevel::Warn,
                    format!(
                        "max clients ({}) reached, rejecting {}",
                        self.registry.capacity(),
                        conn_id
                    ),
                ),
                ServerAction::Close { conn_id, reason: CloseReason::CapacityExceeded },
            ]);
        }

        let slot = self.registry.add(conn_id, peer_addr)?;

        Ok(vec![ServerAction::log(
            LogLevel::Info,
            format!("{conn_id} accepted from {} into slot {slot}", describe_peer(peer_addr)),
        )])
    }

    /// Handle bytes read from a connection.
    ///
    /// Lines are routed one at a time. If a line ends the connection (failed
    /// handshake, over-long line), whatever else was buffered is dropped with
    /// it.
    fn handle_bytes_received(
        &mut self,
        conn_id: ConnectionId,
        data: &[u8],
    ) -> Result<Vec<ServerAction>, DriverError> {
        let mut actions = Vec::new();

        match self.registry.get_mut(conn_id) {
            Some(conn) => conn.inbound_mut().push(data),
            None => {
                actions.push(ServerAction::log(
                    LogLevel::Debug,
                    format!("dropping {} bytes for unknown {}", data.len(), conn_id),
                ));
                return Ok(actions);
            },
        }

        loop {
            let next = match self.registry.get_mut(conn_id) {
                Some(conn) => conn.inbound_mut().next_line(),
                None => break,
            };

            match next {
                Some(Ok(line)) => self.route_line(conn_id, &line, &mut actions)?,
                Some(Err(err)) => {
                    let violation = ProtocolViolation::from(err);
                    actions.push(ServerAction::log(
                        LogLevel::Warn,
                        format!("{conn_id} violated protocol: {violation}"),
                    ));
                    actions.extend(self.teardown(conn_id, violation.into()));
                    break;
                },
                None => break,
            }
        }

        Ok(actions)
    }

    /// Send a complete line to the handshake or to fan-out.
    fn route_line(
        &mut self,
        conn_id: ConnectionId,
        line: &Bytes,
        actions: &mut Vec<ServerAction>,
    ) -> Result<(), DriverError> {
        let Some(name) = self.registry.get(conn_id).and_then(|conn| conn.display_name()) else {
            return self.handle_join(conn_id, line, actions);
        };

        let payload = broadcast::chat_line(name, line);
        broadcast::fan_out(&self.registry, Some(conn_id), &payload, actions);

        Ok(())
    }

    /// Handle the first line of an unauthenticated connection.
    fn handle_join(
        &mut self,
        conn_id: ConnectionId,
        line: &Bytes,
        actions: &mut Vec<ServerAction>,
    ) -> Result<(), DriverError> {
        let name = match handshake::parse_join(line, self.config.max_name_len) {
            Ok(name) => name,
            Err(err) => {
                actions.push(ServerAction::log(
                    LogLevel::Info,
                    format!("{conn_id} did not send a valid JOIN ({err}), closing"),
                ));
                actions.extend(self.teardown(conn_id, ProtocolViolation::from(err).into()));
                return Ok(());
            },
        };

        let notice = broadcast::join_notice(&name);
        actions.push(ServerAction::log(LogLevel::Info, format!("{conn_id} joined as '{name}'")));
        self.registry.mark_member(conn_id, name)?;

        broadcast::fan_out(&self.registry, Some(conn_id), &notice, actions);

        if let Some(banner) = &self.config.welcome_banner {
            actions.push(ServerAction::SendTo { conn_id, payload: broadcast::server_notice(banner) });
        }

        Ok(())
    }

    /// Remove a connection and close its socket.
    ///
    /// Idempotent: tearing down a connection that is not registered (never
    /// admitted, or already torn down) produces no actions.
    fn teardown(&mut self, conn_id: ConnectionId, reason: CloseReason) -> Vec<ServerAction> {
        let Some(conn) = self.registry.remove(conn_id) else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        let peer = describe_peer(conn.peer_addr());

        match conn.state() {
            ConnectionState::Member { display_name } => {
                actions.push(ServerAction::log(
                    LogLevel::Info,
                    format!("{display_name} ({conn_id} from {peer}) disconnected: {reason}"),
                ));

                let announce = self.config.announce_departures && reason != CloseReason::Shutdown;
                actions.push(ServerAction::Close { conn_id, reason });

                if announce {
                    let notice = broadcast::departure_notice(display_name);
                    broadcast::fan_out(&self.registry, Some(conn_id), &notice, &mut actions);
                }
            },
            ConnectionState::Unauthenticated => {
                actions.push(ServerAction::log(
                    LogLevel::Debug,
                    format!("{conn_id} from {peer} disconnected before joining: {reason}"),
                ));
                actions.push(ServerAction::Close { conn_id, reason });
            },
        }

        actions
    }

    /// Tear down every connection, without departure notices.
    pub fn shutdown(&mut self) -> Vec<ServerAction> {
        let ids: Vec<ConnectionId> = self.registry.connections().map(|conn| conn.id()).collect();

        ids.into_iter().flat_map(|conn_id| self.teardown(conn_id, CloseReason::Shutdown)).collect()
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Slot index of a connection, for ordering work within a round.
    pub fn slot_of(&self, conn_id: ConnectionId) -> Option<usize> {
        self.registry.slot_of(conn_id)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of joined connections.
    pub fn member_count(&self) -> usize {
        self.registry.member_count()
    }

    /// Display names of current members.
    pub fn roster(&self) -> Vec<String> {
        self.registry.roster()
    }

    /// Relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

fn describe_peer(peer_addr: Option<SocketAddr>) -> String {
    peer_addr.map_or_else(|| "unknown peer".to_string(), |addr| addr.to_string())
}
