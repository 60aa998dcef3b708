//! Layered Ingestion Settings
//!
//! Listener, framing, queue and routing settings resolved from three layers,
//! lowest priority first:
//!
//! 1. Built-in defaults (`constants`)
//! 2. Entries of the application property document under the `connection.`,
//!    `framing.`, `queue.` and `routing.` prefixes
//! 3. Environment variables prefixed `SOCKET_`, with `__` between path
//!    segments (`SOCKET_CONNECTION__PORT=7000`)
//!
//! ```properties
//! connection.port = 9090
//! connection.idle_timeout_ms = 30000
//! framing.policy = delimiter
//! framing.delimiter = 10
//! queue.capacity = 100000
//! queue.overflow = drop_oldest
//! routing.domain_field = region
//! ```

use crate::constants::{self, ENV_PREFIX};
use crate::properties::AppProperties;
use crate::{ConfigError, Result};
use config_crate::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Property prefixes that feed the settings layer
const SETTINGS_PREFIXES: [&str; 4] = ["connection.", "framing.", "queue.", "routing."];

/// Complete ingestion settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IngestSettings {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub framing: FramingSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
}

/// TCP listener settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Force-flush and close connections idle for this long; absent means never
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

/// Message boundary policy
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FramingPolicyKind {
    /// One message per connection, completed when the client closes
    #[default]
    Close,
    /// Messages separated by a delimiter byte
    Delimiter,
    /// Messages prefixed with a 4-byte big-endian length
    LengthPrefix,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FramingSettings {
    #[serde(default)]
    pub policy: FramingPolicyKind,
    #[serde(default = "default_delimiter")]
    pub delimiter: u8,
    #[serde(default)]
    pub max_message_bytes: Option<usize>,
}

/// What a bounded queue does when full
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyKind {
    Block,
    DropOldest,
    #[default]
    Reject,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct QueueSettings {
    /// Absent means unbounded
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowPolicyKind,
}

/// Fields the downstream consumer reads from each parsed payload
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoutingSettings {
    #[serde(default = "default_message_type_field")]
    pub message_type_field: String,
    #[serde(default = "default_domain_field")]
    pub domain_field: String,
    #[serde(default)]
    pub default_topic: Option<String>,
}

fn default_host() -> String {
    constants::connection::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    constants::connection::DEFAULT_PORT
}

fn default_read_buffer_bytes() -> usize {
    constants::connection::DEFAULT_READ_BUFFER_BYTES
}

fn default_drain_timeout_ms() -> u64 {
    constants::connection::DEFAULT_DRAIN_TIMEOUT_MS
}

fn default_delimiter() -> u8 {
    constants::wire::DEFAULT_DELIMITER
}

fn default_message_type_field() -> String {
    constants::routing::DEFAULT_MESSAGE_TYPE_FIELD.to_string()
}

fn default_domain_field() -> String {
    constants::routing::DEFAULT_DOMAIN_FIELD.to_string()
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_ms: None,
            read_buffer_bytes: default_read_buffer_bytes(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl Default for FramingSettings {
    fn default() -> Self {
        Self {
            policy: FramingPolicyKind::Close,
            delimiter: default_delimiter(),
            max_message_bytes: None,
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            message_type_field: default_message_type_field(),
            domain_field: default_domain_field(),
            default_topic: None,
        }
    }
}

impl ConnectionSettings {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl IngestSettings {
    /// Resolve settings from a property document plus `SOCKET_*` environment overrides
    pub fn from_properties(props: &AppProperties) -> Result<Self> {
        Self::build(props, Some(Environment::with_prefix(ENV_PREFIX)))
    }

    /// Resolve settings from a property document alone
    pub fn from_properties_only(props: &AppProperties) -> Result<Self> {
        Self::build(props, None)
    }

    fn build(props: &AppProperties, env: Option<Environment>) -> Result<Self> {
        let mut builder = Config::builder();

        for (key, value) in props.iter() {
            if SETTINGS_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                debug!(key, value, "Applying property to settings layer");
                builder = builder.set_default(key, value)?;
            }
        }

        if let Some(env) = env {
            builder = builder.add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: IngestSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        info!(
            port = settings.connection.port,
            framing = ?settings.framing.policy,
            queue_capacity = ?settings.queue.capacity,
            idle_timeout_ms = ?settings.connection.idle_timeout_ms,
            "Resolved ingestion settings"
        );
        Ok(settings)
    }

    /// Replace the listen port (command-line override)
    pub fn with_port(mut self, port: u16) -> Self {
        self.connection.port = port;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.connection.read_buffer_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "connection.read_buffer_bytes",
                "must be greater than zero",
            ));
        }
        if self.queue.capacity == Some(0) {
            return Err(ConfigError::invalid_value(
                "queue.capacity",
                "must be greater than zero when set",
            ));
        }
        if self.framing.max_message_bytes == Some(0) {
            return Err(ConfigError::invalid_value(
                "framing.max_message_bytes",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Log a resolved configuration map, one `key : value` per line
pub fn dump_configuration<'a, I>(entries: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut rendered = String::new();
    for (key, value) in entries {
        rendered.push_str(key);
        rendered.push_str(" : ");
        rendered.push_str(value);
        rendered.push('\n');
    }
    info!("Starting connector with configuration:\n{}", rendered);
}
