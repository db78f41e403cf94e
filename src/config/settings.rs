use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration for the relay process.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub log: LogSettings,
}

/// Address the WebSocket server binds to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Dispatch loop and middleware delivery parameters.
///
/// `period_ms` and `queue_size` are handed to the middleware when the dynamic
/// subscription is registered. The middleware drops deliveries once
/// `queue_size` messages are waiting, so backpressure happens at the source.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub period_ms: u64,
    pub queue_size: usize,
    pub handshake_retry_ms: u64,
    pub directory_poll_ms: u64,
    pub connection_queue_depth: usize,
    pub write_timeout_ms: u64,
}

impl RelaySettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn handshake_retry(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_ms)
    }

    pub fn directory_poll(&self) -> Duration {
        Duration::from_millis(self.directory_poll_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub period_ms: Option<u64>,
    pub queue_size: Option<usize>,
    pub handshake_retry_ms: Option<u64>,
    pub directory_poll_ms: Option<u64>,
    pub connection_queue_depth: Option<usize>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            relay: RelaySettings {
                period_ms: 100,
                queue_size: 1,
                handshake_retry_ms: 1000,
                directory_poll_ms: 1000,
                connection_queue_depth: 64,
                write_timeout_ms: 2000,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay the values present in `self` onto the defaults.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server.unwrap_or_default();
        let relay = self.relay.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            relay: RelaySettings {
                period_ms: relay.period_ms.unwrap_or(default.relay.period_ms),
                queue_size: relay.queue_size.unwrap_or(default.relay.queue_size),
                handshake_retry_ms: relay
                    .handshake_retry_ms
                    .unwrap_or(default.relay.handshake_retry_ms),
                directory_poll_ms: relay
                    .directory_poll_ms
                    .unwrap_or(default.relay.directory_poll_ms),
                connection_queue_depth: relay
                    .connection_queue_depth
                    .unwrap_or(default.relay.connection_queue_depth),
                write_timeout_ms: relay
                    .write_timeout_ms
                    .unwrap_or(default.relay.write_timeout_ms),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}
