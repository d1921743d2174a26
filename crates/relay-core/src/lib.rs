//! Line relay core.
//!
//! Pure protocol logic for a line-oriented chat relay. Nothing in this crate
//! touches a socket: the runtime feeds [`ServerEvent`]s into a
//! [`RelayDriver`] and executes the [`ServerAction`]s it returns.
//!
//! # Architecture
//!
//! The driver follows the Sans-IO pattern. It owns the only mutable state of
//! the relay (the [`ConnectionRegistry`]) and is driven from a single thread,
//! so no locking is involved anywhere in the core.
//!
//! ```text
//!  bytes ──> LineFramer ──> line ──┬─> handshake (Unauthenticated)
//!                                  └─> broadcast (Member)
//! ```
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: fixed-capacity slot table of connections
//! - [`LineFramer`]: reassembles byte chunks into logical lines
//! - [`handshake`]: `JOIN <name>` parsing and the single state transition
//! - [`broadcast`]: message formatting and member fan-out
//! - [`RelayDriver`]: event → action orchestrator

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod broadcast;
mod config;
mod driver;
mod error;
mod event;
mod framer;
pub mod handshake;
mod registry;

pub use config::{ConfigError, DEFAULT_MAX_CLIENTS, DEFAULT_WELCOME_BANNER, RelayConfig};
pub use driver::RelayDriver;
pub use error::{CloseReason, DriverError, ProtocolViolation};
pub use event::{LogLevel, ServerAction, ServerEvent};
pub use framer::{DEFAULT_MAX_LINE_LEN, FramingError, LineFramer, Lines};
pub use handshake::{DEFAULT_MAX_NAME_LEN, HandshakeError};
pub use registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionState, RegistryError};
