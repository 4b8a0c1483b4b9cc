use serde::Deserialize;

/// Top-level configuration settings for the hub.
///
/// Groups the listener, the persistence relay, the hub queues and logging.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub hub: HubSettings,
    pub log: LogSettings,
}

/// Where the WebSocket endpoint listens.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Request path that is allowed to upgrade, e.g. `/ws`.
    pub ws_path: String,
}

/// Persistence endpoint the hub relays every inbound message to.
///
/// `url` is optional: without it the relay is disabled and messages are only
/// broadcast.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub url: Option<String>,
    pub timeout_ms: u64,
    pub mode: RelayMode,
    pub max_in_flight: usize,
}

/// Whether a reader waits for the persistence round trip before enqueueing.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Await the relay call inside the reader loop.
    #[default]
    Inline,
    /// Spawn the relay call and enqueue right away.
    Detached,
}

/// Queue sizing and fan-out behaviour of the hub.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub outbound_capacity: usize,
    pub echo_to_sender: bool,
}

/// What a reader does when the inbound queue is full.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for the dispatcher to make room.
    #[default]
    Block,
    /// Drop the message and log it.
    Drop,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every value is optional; anything missing is filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub hub: Option<PartialHubSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ws_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub mode: Option<RelayMode>,
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub queue_capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
    pub outbound_capacity: Option<usize>,
    pub echo_to_sender: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5000,
            mode: RelayMode::Inline,
            max_in_flight: 64,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            overflow: OverflowPolicy::Block,
            outbound_capacity: 256,
            echo_to_sender: true,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
