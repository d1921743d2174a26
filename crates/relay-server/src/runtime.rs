//! Event loop.
//!
//! One thread, one poller. Each round accepts pending connections first, then
//! services ready connections in registry-slot order. Every driver call runs
//! to completion, including the writes it asks for, before the next
//! connection is looked at; the poll is the only place the loop waits.
//!
//! A connection gets at most [`READS_PER_ROUND`] reads per round. Readiness is
//! edge-triggered, so a connection that still has unread data after its budget
//! is carried into the next round's ready set, and that round polls without
//! blocking.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use mio::{Events, Interest, Poll, Token, Waker, net::TcpListener};
use relay_core::{CloseReason, ConnectionId, RelayDriver, ServerEvent};

use crate::{
    ServerError, ServerRuntimeConfig,
    executor::execute_actions,
    transport::{ConnectionTable, ReadOutcome, connection_for},
};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Reads one connection may take before the rest of the round is serviced.
pub const READS_PER_ROUND: usize = 16;

/// Poll timeout while the listener holds connections that failed to accept.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// Stops a running [`Server`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Ask the loop to close every connection and return.
    pub fn shutdown(&self) -> io::Result<()> {
        self.stop.store(true, Ordering::Release);
        self.waker.wake()
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle").field("stop", &self.stop).finish_non_exhaustive()
    }
}

/// A connection the poller reported in this round.
#[derive(Debug, Clone, Copy)]
struct Ready {
    conn_id: ConnectionId,
    errored: bool,
}

/// Line relay server.
///
/// Wraps [`RelayDriver`] with a mio poller and non-blocking TCP sockets.
pub struct Server {
    /// Readiness poller
    poll: Poll,
    /// Listening socket
    listener: TcpListener,
    /// Open connection sockets
    connections: ConnectionTable,
    /// The action-based relay driver
    driver: RelayDriver,
    /// Set by [`ShutdownHandle`]
    stop: Arc<AtomicBool>,
    /// Wakes the poller for shutdown
    waker: Arc<Waker>,
    /// Next connection id to hand out
    next_conn_id: u64,
    /// Connections that used their read budget with data left unread
    backlog: Vec<ConnectionId>,
    /// Last accept failed with connections possibly still queued
    accept_retry: bool,
    /// Bytes per read
    read_chunk: usize,
    /// Readiness events per poll
    events_capacity: usize,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = resolve(&config.bind_address)?;

        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)
            .map_err(|e| ServerError::Transport(format!("bind {addr} failed: {e}")))?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let connections = ConnectionTable::new(poll.registry().try_clone()?);

        tracing::info!("Relay bound to {}", listener.local_addr()?);

        Ok(Self {
            poll,
            listener,
            connections,
            driver: RelayDriver::new(config.driver),
            stop: Arc::new(AtomicBool::new(false)),
            waker,
            next_conn_id: 0,
            backlog: Vec::new(),
            accept_retry: false,
            read_chunk: config.read_chunk,
            events_capacity: config.events_capacity,
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops [`Server::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { stop: Arc::clone(&self.stop), waker: Arc::clone(&self.waker) }
    }

    /// Relay driver (read-only).
    pub fn driver(&self) -> &RelayDriver {
        &self.driver
    }

    /// Run the event loop until shut down or the poller fails.
    ///
    /// On shutdown every connection is closed without departure notices.
    pub fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("Relay accepting connections on {}", self.local_addr()?);

        let mut events = Events::with_capacity(self.events_capacity);
        let mut buf = vec![0u8; self.read_chunk];

        loop {
            let timeout = poll_timeout(!self.backlog.is_empty(), self.accept_retry);
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Transport(format!("poll failed: {e}")));
            }

            if self.stop.load(Ordering::Acquire) {
                break;
            }

            let mut accept = self.accept_retry;
            let mut ready: Vec<Ready> =
                self.backlog.drain(..).map(|conn_id| Ready { conn_id, errored: false }).collect();
            for event in &events {
                match event.token() {
                    LISTENER => accept = true,
                    WAKER => {},
                    token => {
                        if let Some(conn_id) = connection_for(token) {
                            ready.push(Ready { conn_id, errored: event.is_error() });
                        }
                    },
                }
            }

            if accept {
                self.accept_pending()?;
            }

            ready.sort_by_key(|r| (self.driver.slot_of(r.conn_id).unwrap_or(usize::MAX), r.conn_id));
            ready.dedup_by(|later, kept| {
                let same = later.conn_id == kept.conn_id;
                if same {
                    kept.errored |= later.errored;
                }
                same
            });
            for r in ready {
                self.service(r, &mut buf)?;
            }
        }

        if self.connections.is_empty() {
            tracing::info!("Relay shutting down");
        } else {
            tracing::info!("Relay shutting down, closing {} connections", self.connections.len());
        }
        let actions = self.driver.shutdown();
        execute_actions(&mut self.driver, actions, &mut self.connections)
    }

    /// Accept until the listener would block.
    ///
    /// On any other accept error (out of descriptors, for one) the listener is
    /// retried on a timer, since no new readiness event may arrive for
    /// connections already queued.
    fn accept_pending(&mut self) -> Result<(), ServerError> {
        loop {
            let (stream, peer_addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.accept_retry = false;
                    return Ok(());
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept error, retrying in {:?}: {}", ACCEPT_RETRY, e);
                    self.accept_retry = true;
                    return Ok(());
                },
            };

            let conn_id = ConnectionId(self.next_conn_id);
            self.next_conn_id += 1;

            if let Err(e) = self.connections.insert(conn_id, stream) {
                tracing::warn!("Failed to register {} from {}: {}", conn_id, peer_addr, e);
                continue;
            }

            self.dispatch(ServerEvent::ConnectionAccepted { conn_id, peer_addr: Some(peer_addr) })?;
        }
    }

    /// Read one ready connection until it would block or its budget runs out.
    fn service(&mut self, ready: Ready, buf: &mut [u8]) -> Result<(), ServerError> {
        let conn_id = ready.conn_id;

        // Torn down earlier in this round
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if ready.errored {
            let reason = self
                .connections
                .take_error(conn_id)
                .map_or_else(|| "socket error".to_string(), |e| e.to_string());
            return self.dispatch(ServerEvent::ConnectionClosed {
                conn_id,
                reason: CloseReason::Transport(reason),
            });
        }

        for _ in 0..READS_PER_ROUND {
            if !self.connections.contains(conn_id) {
                return Ok(());
            }

            match self.connections.read(conn_id, buf) {
                ReadOutcome::Data(n) => {
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    self.dispatch(ServerEvent::BytesReceived { conn_id, data })?;
                },
                ReadOutcome::WouldBlock | ReadOutcome::Gone => return Ok(()),
                ReadOutcome::Closed => {
                    return self.dispatch(ServerEvent::ConnectionClosed {
                        conn_id,
                        reason: CloseReason::PeerClosed,
                    });
                },
                ReadOutcome::Failed(e) => {
                    return self.dispatch(ServerEvent::ConnectionClosed {
                        conn_id,
                        reason: CloseReason::Transport(e.to_string()),
                    });
                },
            }
        }

        if self.connections.contains(conn_id) {
            self.backlog.push(conn_id);
        }

        Ok(())
    }

    /// Feed one event to the driver and execute the result.
    fn dispatch(&mut self, event: ServerEvent) -> Result<(), ServerError> {
        let actions = self.driver.process_event(event)?;
        execute_actions(&mut self.driver, actions, &mut self.connections)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("connections", &self.connections.len())
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

/// How long the next poll may block.
fn poll_timeout(backlog: bool, accept_retry: bool) -> Option<Duration> {
    if backlog {
        Some(Duration::ZERO)
    } else if accept_retry {
        Some(ACCEPT_RETRY)
    } else {
        None
    }
}

/// Resolve a bind address, taking the first result.
fn resolve(bind_address: &str) -> Result<SocketAddr, ServerError> {
    bind_address
        .to_socket_addrs()
        .map_err(|e| ServerError::Config(format!("invalid bind address '{bind_address}': {e}")))?
        .next()
        .ok_or_else(|| ServerError::Config(format!("'{bind_address}' resolved to no address")))
}
