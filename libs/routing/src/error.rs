//! Routing error types

use thiserror::Error;

/// Failures deriving a key or resolving a topic for one message.
///
/// Every variant is scoped to a single message: the consumer logs it and moves
/// on to the next one.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// A declared key field is absent from the payload
    #[error("Key field '{field}' missing from {message_type} payload")]
    MissingKeyField { message_type: String, field: String },

    /// A declared key field holds null, an array or an object
    #[error("Key field '{field}' of {message_type} is not a scalar ({kind})")]
    NonScalarKeyField {
        message_type: String,
        field: String,
        kind: &'static str,
    },

    /// Payload is not a JSON object
    #[error("Invalid payload from connection {connection_id}: {message}")]
    InvalidPayload {
        connection_id: u64,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Payload carries no usable message type
    #[error("Payload from connection {connection_id} has no '{field}' message type")]
    MissingMessageType { connection_id: u64, field: String },

    /// Message type is not in the master list
    #[error("Message type '{message_type}' is not configured")]
    UnknownMessageType { message_type: String },

    /// No topic for the domain and no default topic configured
    #[error("No topic for domain {domain:?}")]
    TopicNotFound { domain: Option<String> },
}

/// Result type alias for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

impl RoutingError {
    pub fn missing_key_field(message_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingKeyField {
            message_type: message_type.into(),
            field: field.into(),
        }
    }

    pub fn invalid_payload(
        connection_id: u64,
        message: impl Into<String>,
        source: Option<serde_json::Error>,
    ) -> Self {
        Self::InvalidPayload {
            connection_id,
            message: message.into(),
            source,
        }
    }

    /// Whether the failure comes from a missing declared key field
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, Self::MissingKeyField { .. })
    }
}
