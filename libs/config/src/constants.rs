//! Property names, reserved ids and defaults shared by every crate.

/// Property holding the comma-separated master list of message type ids.
pub const ALL_CONFIG_NAMES: &str = "all.config.names";

/// Reserved domain-document key whose value is `domain:topic` pairs.
pub const DOMAIN_TOPIC_MAPPING: &str = "domain-topic-mapping";

/// Property holding the TCP listen port.
pub const CONNECTION_PORT: &str = "connection.port";

/// Listener defaults
pub mod connection {
    /// Port used when neither the property document nor the environment sets one
    pub const DEFAULT_PORT: u16 = 9090;

    /// Bind on every interface unless told otherwise
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Socket read buffer size
    pub const DEFAULT_READ_BUFFER_BYTES: usize = 64 * 1024;

    /// How long `stop()` waits for in-flight connections to flush
    pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;
}

/// Wire-level constants
pub mod wire {
    /// Acknowledgement written after every non-empty chunk
    pub const ACK_TOKEN: &[u8] = b"OK\r\n";

    /// Safety margin below `i32::MAX` at which the running byte counter resets
    pub const COUNTER_HEADROOM: u32 = 5_000;

    /// Delimiter used by the delimiter framing policy when none is configured
    pub const DEFAULT_DELIMITER: u8 = b'\n';
}

/// Routing defaults for the downstream consumer
pub mod routing {
    /// Payload field naming the message type id
    pub const DEFAULT_MESSAGE_TYPE_FIELD: &str = "messageType";

    /// Payload field naming the routing domain
    pub const DEFAULT_DOMAIN_FIELD: &str = "domain";
}

/// Prefix for environment overrides (`SOCKET_CONNECTION__PORT=7000`)
pub const ENV_PREFIX: &str = "SOCKET";
