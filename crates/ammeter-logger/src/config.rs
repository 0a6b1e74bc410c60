//! Timing and connection settings for the ammeter client.

use std::time::Duration;

/// Default serial baud rate of the ammeter console.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Timing configuration for the receive loop and command channel.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pause between transport reads when nothing is pending.
    pub receive_poll_interval: Duration,

    /// Re-check interval while a command waits for its answer.
    pub command_poll_interval: Duration,

    /// Deadline for a query or start/stop confirmation.
    pub response_timeout: Duration,

    /// Extra time allowed on top of the device's init timeout.
    pub init_grace: Duration,

    /// Init timeout used when the device does not report its configuration.
    pub default_init_timeout: Duration,

    /// Pause after `CMD:INTERVAL` before the new config is read back.
    pub interval_settle: Duration,

    /// Size of the buffer used for each transport read.
    pub read_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            receive_poll_interval: Duration::from_millis(100),
            command_poll_interval: Duration::from_millis(250),
            response_timeout: Duration::from_secs(3),
            init_grace: Duration::from_secs(2),
            default_init_timeout: Duration::from_secs(30),
            interval_settle: Duration::from_millis(200),
            read_chunk_size: 1024,
        }
    }
}

impl ClientConfig {
    /// Set the receive loop poll interval.
    pub fn with_receive_poll_interval(mut self, interval: Duration) -> Self {
        self.receive_poll_interval = interval;
        self
    }

    /// Set the command poll interval.
    pub fn with_command_poll_interval(mut self, interval: Duration) -> Self {
        self.command_poll_interval = interval;
        self
    }

    /// Set the response deadline for queries and start/stop.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the grace period added to the device init timeout.
    pub fn with_init_grace(mut self, grace: Duration) -> Self {
        self.init_grace = grace;
        self
    }

    /// Set the fallback init timeout.
    pub fn with_default_init_timeout(mut self, timeout: Duration) -> Self {
        self.default_init_timeout = timeout;
        self
    }

    /// Set the settle time after changing the interval.
    pub fn with_interval_settle(mut self, settle: Duration) -> Self {
        self.interval_settle = settle;
        self
    }
}

/// Serial port connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Serial device path (e.g. `/dev/ttyUSB0`).
    pub path: String,
    /// Baud rate.
    pub baud_rate: u32,
}

impl SerialSettings {
    /// Create settings for the given port.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        SerialSettings {
            path: path.into(),
            baud_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_timing() {
        let config = ClientConfig::default();
        assert_eq!(config.receive_poll_interval, Duration::from_millis(100));
        assert_eq!(config.command_poll_interval, Duration::from_millis(250));
        assert_eq!(config.response_timeout, Duration::from_secs(3));
        assert_eq!(config.init_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::default()
            .with_response_timeout(Duration::from_millis(500))
            .with_command_poll_interval(Duration::from_millis(20));
        assert_eq!(config.response_timeout, Duration::from_millis(500));
        assert_eq!(config.command_poll_interval, Duration::from_millis(20));
        assert_eq!(config.receive_poll_interval, Duration::from_millis(100));
    }
}
