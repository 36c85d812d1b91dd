//! Client configuration.

use std::time::Duration;

/// Timeout configuration for connection phases.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Time to establish the TCP connection (default: 15s).
    pub connect_timeout: Duration,
    /// Idle receive deadline; when it elapses the connection is marked
    /// disconnected (default: 180s, the server's own socket timeout).
    pub idle_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(180),
        }
    }
}

/// Connection configuration.
///
/// Defaults match the 4D SQL server's conventions: port 19812 and the
/// `Administrator` account with an empty password.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Account name.
    pub user: String,
    /// Account password.
    pub password: String,
    /// Maximum rows requested per page. The default is large enough that
    /// ordinary queries complete in one round trip; pagination exists for
    /// results exceeding one page's practical size.
    pub fetch_limit: u32,
    /// OS name reported on login.
    pub os_name: String,
    /// OS version reported on login.
    pub os_version: String,
    /// Timeouts.
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 19812,
            user: "Administrator".to_string(),
            password: String::new(),
            fetch_limit: 999_999,
            os_name: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the account credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the per-page fetch limit.
    #[must_use]
    pub fn with_fetch_limit(mut self, limit: u32) -> Self {
        self.fetch_limit = limit;
        self
    }

    /// Set the timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 19812);
        assert_eq!(config.user, "Administrator");
        assert_eq!(config.password, "");
        assert_eq!(config.fetch_limit, 999_999);
        assert_eq!(config.timeouts.idle_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_host("db.example.net")
            .with_port(20000)
            .with_credentials("designer", "secret")
            .with_fetch_limit(100);
        assert_eq!(config.host, "db.example.net");
        assert_eq!(config.port, 20000);
        assert_eq!(config.user, "designer");
        assert_eq!(config.fetch_limit, 100);
    }
}
