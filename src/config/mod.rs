mod settings;

use std::env;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    HubSettings, LogSettings, OverflowPolicy, RelayMode, RelaySettings, ServerSettings, Settings,
};

/// Legacy relay URL variable, honoured when no prefixed value is set.
pub const LEGACY_RELAY_URL_VAR: &str = "SERVER_MESSAGE_URL";
/// Legacy listen port variable, honoured when no prefixed value is set.
pub const LEGACY_PORT_VAR: &str = "PORT";

/// Largest queue or permit count tokio accepts.
pub const MAX_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Bounds a queue capacity or permit count to `1..=MAX_CAPACITY`.
pub fn clamp_capacity(n: usize) -> usize {
    n.clamp(1, MAX_CAPACITY)
}

/// Loads the configuration from `config/default.*` and `CHATHUB_*` environment variables,
/// then fills whatever is still missing from the legacy variables and the defaults.
///
/// Nested keys use a double underscore, e.g. `CHATHUB_RELAY__TIMEOUT_MS=2000`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("CHATHUB")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server.unwrap_or_default();
    let relay = partial.relay.unwrap_or_default();
    let hub = partial.hub.unwrap_or_default();
    let log = partial.log.unwrap_or_default();

    let legacy_port = env::var(LEGACY_PORT_VAR)
        .ok()
        .and_then(|p| p.trim().parse::<u16>().ok());
    let legacy_url = env::var(LEGACY_RELAY_URL_VAR).ok().and_then(non_empty);

    Settings {
        server: ServerSettings {
            host: server.host.unwrap_or(default.server.host),
            port: server.port.or(legacy_port).unwrap_or(default.server.port),
            ws_path: server
                .ws_path
                .map(|p| normalize_path(&p))
                .unwrap_or(default.server.ws_path),
        },
        relay: RelaySettings {
            url: relay
                .url
                .and_then(non_empty)
                .or(legacy_url)
                .or(default.relay.url),
            timeout_ms: relay.timeout_ms.unwrap_or(default.relay.timeout_ms),
            mode: relay.mode.unwrap_or(default.relay.mode),
            max_in_flight: relay
                .max_in_flight
                .map_or(default.relay.max_in_flight, clamp_capacity),
        },
        hub: HubSettings {
            queue_capacity: hub
                .queue_capacity
                .map_or(default.hub.queue_capacity, clamp_capacity),
            overflow: hub.overflow.unwrap_or(default.hub.overflow),
            outbound_capacity: hub
                .outbound_capacity
                .map_or(default.hub.outbound_capacity, clamp_capacity),
            echo_to_sender: hub.echo_to_sender.unwrap_or(default.hub.echo_to_sender),
        },
        log: LogSettings {
            level: log.level.unwrap_or(default.log.level),
        },
    }
}

// An empty value counts as unset.
fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
