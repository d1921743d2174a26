//! Runtime configuration.

use relay_core::RelayConfig;

use crate::ServerError;

/// Default listen address, all interfaces on the relay's well-known port.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:5000")
    pub bind_address: String,
    /// Bytes requested per `read` call
    pub read_chunk: usize,
    /// Readiness events collected per poll
    pub events_capacity: usize,
    /// Driver configuration (limits, notices)
    pub driver: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            read_chunk: 4096,
            events_capacity: 256,
            driver: RelayConfig::default(),
        }
    }
}

impl ServerRuntimeConfig {
    /// Reject values the runtime cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.read_chunk == 0 {
            return Err(ServerError::Config("read_chunk must be greater than zero".to_string()));
        }

        if self.events_capacity == 0 {
            return Err(ServerError::Config(
                "events_capacity must be greater than zero".to_string(),
            ));
        }

        self.driver.validate().map_err(|e| ServerError::Config(e.to_string()))
    }
}
