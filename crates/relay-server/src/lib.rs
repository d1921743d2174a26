//! Line relay server.
//!
//! Production runtime around [`relay_core`]'s sans-IO [`RelayDriver`]: a
//! single-threaded mio event loop owning the listener and every connection
//! socket.
//!
//! # Architecture
//!
//! ```text
//!   poll ──> accept ──> ConnectionAccepted ─┐
//!        └─> read ────> BytesReceived ──────┼─> RelayDriver ──> actions ──> executor
//!            EOF/error ConnectionClosed ────┘                                  │
//!                                           failed writes ─> ConnectionClosed ─┘
//! ```
//!
//! # Components
//!
//! - [`Server`]: poll loop, accept, per-connection reads
//! - [`execute_actions`]: runs driver actions against an [`Outbound`]
//! - [`ConnectionTable`]: non-blocking sockets keyed by [`ConnectionId`]
//!
//! [`RelayDriver`]: relay_core::RelayDriver
//! [`ConnectionId`]: relay_core::ConnectionId

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod executor;
mod runtime;
mod transport;

pub use config::{DEFAULT_BIND_ADDRESS, ServerRuntimeConfig};
pub use error::ServerError;
pub use executor::{Outbound, execute_actions};
pub use relay_core::RelayConfig;
pub use runtime::{READS_PER_ROUND, Server, ShutdownHandle};
pub use transport::{ConnectionTable, ReadOutcome};
