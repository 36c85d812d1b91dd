//! Test fixture utilities.

use fourd_client::{Config, TimeoutConfig};
use std::time::Duration;

use crate::mock_server::Mock4dServer;

/// Connection configuration pointed at a mock server, with timeouts short
/// enough that a misbehaving test fails quickly.
#[must_use]
pub fn config_for(server: &Mock4dServer) -> Config {
    Config::new()
        .with_host(server.host())
        .with_port(server.port())
        .with_timeouts(TimeoutConfig {
            connect_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(2),
        })
}
