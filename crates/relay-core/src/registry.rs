//! Connection registry.
//!
//! Fixed-capacity slot table holding every live connection. Capacity is an
//! admission knob: once all slots are taken, [`ConnectionRegistry::add`] fails
//! and the runtime closes the new socket without registering it.
//!
//! Slots are recycled through a LIFO free-list, so a slot released by teardown
//! is the first one handed to the next accept. A side index maps
//! [`ConnectionId`] to slot, keeping add, remove and lookup O(1). Iteration
//! walks the slots in index order; that order is stable within a dispatch
//! round but carries no meaning beyond that.

use std::{collections::HashMap, fmt, net::SocketAddr};

use thiserror::Error;

use crate::framer::LineFramer;

/// Opaque connection handle.
///
/// Assigned by the runtime on accept. The runtime never reuses an id, so it is
/// unique for as long as the connection is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handshake state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no valid `JOIN` seen yet
    Unauthenticated,
    /// Joined under a display name; terminal for the connection's life
    Member {
        /// Name other members see this connection as
        display_name: String,
    },
}

/// A registered connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    state: ConnectionState,
    inbound: LineFramer,
}

impl Connection {
    fn new(id: ConnectionId, peer_addr: Option<SocketAddr>, max_line_len: usize) -> Self {
        Self {
            id,
            peer_addr,
            state: ConnectionState::Unauthenticated,
            inbound: LineFramer::new(max_line_len),
        }
    }

    /// Connection handle.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, if the runtime supplied one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Current handshake state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Display name. `None` until the connection has joined.
    pub fn display_name(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Member { display_name } => Some(display_name),
            ConnectionState::Unauthenticated => None,
        }
    }

    /// Connection has completed the join handshake.
    pub fn is_member(&self) -> bool {
        matches!(self.state, ConnectionState::Member { .. })
    }

    /// Mutable inbound line buffer.
    pub fn inbound_mut(&mut self) -> &mut LineFramer {
        &mut self.inbound
    }
}

/// Errors from registry mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is taken.
    #[error("registry full ({capacity} connections)")]
    Full {
        /// Registry capacity
        capacity: usize,
    },

    /// The id is already registered. Indicates a runtime bug.
    #[error("connection {0} already registered")]
    Duplicate(ConnectionId),

    /// No connection with this id is registered.
    #[error("connection {0} not registered")]
    UnknownConnection(ConnectionId),

    /// The connection has already joined; the transition happens once.
    #[error("connection {0} has already joined")]
    AlreadyMember(ConnectionId),
}

/// Bounded table of live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// One entry per slot, `None` when free
    slots: Vec<Option<Connection>>,
    /// Free slot indices, next to hand out on top
    free: Vec<usize>,
    /// Connection ID → slot index
    index: HashMap<ConnectionId, usize>,
    /// Line limit for framers of new connections
    max_line_len: usize,
}

impl ConnectionRegistry {
    /// Create a registry with `capacity` slots.
    pub fn new(capacity: usize, max_line_len: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            free: (0..capacity).rev().collect(),
            index: HashMap::with_capacity(capacity),
            max_line_len,
        }
    }

    /// Register a new, unauthenticated connection.
    ///
    /// Returns the slot index it was placed in.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Full`] if all slots are taken
    /// - [`RegistryError::Duplicate`] if `id` is already registered
    pub fn add(
        &mut self,
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
    ) -> Result<usize, RegistryError> {
        if self.index.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        let slot = self.free.pop().ok_or(RegistryError::Full { capacity: self.capacity() })?;

        debug_assert!(self.slots[slot].is_none());
        self.slots[slot] = Some(Connection::new(id, peer_addr, self.max_line_len));
        self.index.insert(id, slot);

        Ok(slot)
    }

    /// Remove a connection and free its slot.
    ///
    /// Idempotent: removing an unknown or already removed id returns `None`
    /// and changes nothing.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let slot = self.index.remove(&id)?;
        let conn = self.slots.get_mut(slot).and_then(Option::take);
        self.free.push(slot);
        conn
    }

    /// Move a connection from `Unauthenticated` to `Member`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if `id` is not registered
    /// - [`RegistryError::AlreadyMember`] if the connection has already joined
    pub fn mark_member(
        &mut self,
        id: ConnectionId,
        display_name: String,
    ) -> Result<(), RegistryError> {
        let conn = self.get_mut(id).ok_or(RegistryError::UnknownConnection(id))?;

        if conn.is_member() {
            return Err(RegistryError::AlreadyMember(id));
        }

        conn.state = ConnectionState::Member { display_name };
        Ok(())
    }

    /// Connection by id.
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        let slot = *self.index.get(&id)?;
        self.slots.get(slot)?.as_ref()
    }

    /// Mutable connection by id.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        let slot = *self.index.get(&id)?;
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Check if a connection is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Slot index of a connection. Used to order work within a round.
    pub fn slot_of(&self, id: ConnectionId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Visit every member except `exclude`, in slot order.
    pub fn for_each_member(
        &self,
        exclude: Option<ConnectionId>,
        mut f: impl FnMut(ConnectionId, &str),
    ) {
        for (id, name) in self.members(exclude) {
            f(id, name);
        }
    }

    /// Iterate over `(id, display_name)` of every member except `exclude`.
    pub fn members(
        &self,
        exclude: Option<ConnectionId>,
    ) -> impl Iterator<Item = (ConnectionId, &str)> + '_ {
        self.connections()
            .filter(move |conn| Some(conn.id) != exclude)
            .filter_map(|conn| conn.display_name().map(|name| (conn.id, name)))
    }

    /// Iterate over all registered connections, in slot order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.slots.iter().flatten()
    }

    /// Display names of all current members, in slot order.
    pub fn roster(&self) -> Vec<String> {
        self.members(None).map(|(_, name)| name.to_owned()).collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// No connections are registered.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of connections that have joined.
    pub fn member_count(&self) -> usize {
        self.members(None).count()
    }

    /// Maximum number of connections.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// All slots are taken.
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }
}
