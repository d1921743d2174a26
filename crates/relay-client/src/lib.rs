//! Line relay client.
//!
//! Connects to a relay, sends the `JOIN` line and then shuttles text both
//! ways over channels. Display concerns (local echo, closing notices) are left
//! to the front-end; the `relay-client` binary is a plain terminal one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod line;
mod transport;

pub use error::ClientError;
pub use transport::{ConnectedClient, InboundEvent, connect};
