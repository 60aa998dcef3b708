//! Configuration Error Types
//!
//! Every variant is fatal at startup: the connector must not begin accepting
//! connections with a partially loaded mapping.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration document could not be read from disk
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required property is absent from the property document
    #[error("Missing required property '{key}'")]
    MissingProperty { key: String },

    /// A declared message type id has no entry in the domain document
    #[error("Message type '{message_type}' is declared but has no entry in the domain document")]
    MissingDomainEntry { message_type: String },

    /// A `domain:topic` pair without a separator or with an empty side
    #[error("Malformed domain-topic pair '{entry}': expected 'domain:topic'")]
    MalformedPair { entry: String },

    /// The domain document is not a JSON object
    #[error("Invalid domain document: {message}")]
    InvalidDocument {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A domain-document entry is not a comma-separated string
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Layered settings failed to build or deserialize
    #[error("Settings error: {0}")]
    Settings(#[from] config_crate::ConfigError),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    /// Create an I/O error for a document path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a missing-property error
    pub fn missing_property(key: impl Into<String>) -> Self {
        Self::MissingProperty { key: key.into() }
    }

    /// Create a missing-domain-entry error
    pub fn missing_domain_entry(message_type: impl Into<String>) -> Self {
        Self::MissingDomainEntry {
            message_type: message_type.into(),
        }
    }

    /// Create a malformed-pair error
    pub fn malformed_pair(entry: impl Into<String>) -> Self {
        Self::MalformedPair {
            entry: entry.into(),
        }
    }

    /// Create an invalid-document error
    pub fn invalid_document(message: impl Into<String>, source: Option<serde_json::Error>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
            source,
        }
    }

    /// Create an invalid-value error
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
