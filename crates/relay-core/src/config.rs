//! Relay configuration.

use thiserror::Error;

use crate::{framer::DEFAULT_MAX_LINE_LEN, handshake::DEFAULT_MAX_NAME_LEN};

/// Default maximum number of concurrent connections.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Default banner unicast to a connection right after it joins.
pub const DEFAULT_WELCOME_BANNER: &str = "Welcome!";

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum concurrent connections, joined or not
    pub max_clients: usize,
    /// Longest accepted line, terminator excluded
    pub max_line_len: usize,
    /// Display names are truncated to this many bytes
    pub max_name_len: usize,
    /// Text of the `[server]` line sent to a connection after it joins
    pub welcome_banner: Option<String>,
    /// Tell remaining members when a member leaves
    pub announce_departures: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            welcome_banner: Some(DEFAULT_WELCOME_BANNER.to_string()),
            announce_departures: true,
        }
    }
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_line_len` must allow at least one byte.
    #[error("max_line_len must be greater than zero")]
    ZeroLineLength,

    /// `max_name_len` must allow at least one byte.
    #[error("max_name_len must be greater than zero")]
    ZeroNameLength,

    /// A `JOIN` line carrying a full-length name must fit in a line.
    #[error("max_name_len ({name}) does not fit in max_line_len ({line}) after the JOIN prefix")]
    NameExceedsLine {
        /// Configured name limit
        name: usize,
        /// Configured line limit
        line: usize,
    },

    /// The banner is sent as a single line.
    #[error("welcome banner must not contain line breaks")]
    MultilineBanner,
}

impl RelayConfig {
    /// Check the configuration for values the relay cannot honor.
    ///
    /// A `max_clients` of zero is allowed; such a relay rejects everyone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_len == 0 {
            return Err(ConfigError::ZeroLineLength);
        }

        if self.max_name_len == 0 {
            return Err(ConfigError::ZeroNameLength);
        }

        if self.max_name_len + crate::handshake::JOIN_PREFIX.len() > self.max_line_len {
            return Err(ConfigError::NameExceedsLine {
                name: self.max_name_len,
                line: self.max_line_len,
            });
        }

        if self.welcome_banner.as_deref().is_some_and(|banner| banner.contains(['\n', '\r'])) {
            return Err(ConfigError::MultilineBanner);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.max_clients, 10);
        assert_eq!(config.max_line_len, 1023);
        assert_eq!(config.max_name_len, 63);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = RelayConfig { max_line_len: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLineLength));

        let config = RelayConfig { max_name_len: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroNameLength));
    }

    #[test]
    fn name_must_fit_in_join_line() {
        let config = RelayConfig { max_line_len: 10, max_name_len: 6, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::NameExceedsLine { name: 6, line: 10 }));

        let config = RelayConfig { max_line_len: 10, max_name_len: 5, ..Default::default() };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn multiline_banner_is_rejected() {
        let config =
            RelayConfig { welcome_banner: Some("hi\nthere".to_string()), ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::MultilineBanner));
    }

    #[test]
    fn zero_clients_is_allowed() {
        let config = RelayConfig { max_clients: 0, ..Default::default() };
        assert_eq!(config.validate(), Ok(()));
    }
}
