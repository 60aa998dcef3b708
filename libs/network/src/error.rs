//! Transport Error Types
//!
//! Errors raised by the listener, the per-connection framer and the ingress
//! queue. Connection-scoped failures are logged where they happen and never
//! leave the connection task; only listener setup and shutdown surface a
//! `TransportError` to the caller.

use crate::message::RawMessage;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Listener could not bind
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// Socket read/write failure
    #[error("I/O error: {message}: {source}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    /// A boundary detector rejected the buffered bytes
    #[error("Framing error: {message}")]
    Framing { message: String },

    /// Ingress queue refused a message
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Listener or connection task failed to complete
    #[error("Task error: {message}")]
    Task { message: String },
}

/// Ingress queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Bounded queue at capacity under the reject policy; the message is handed back
    #[error("Ingress queue full (capacity {capacity})")]
    Full {
        capacity: usize,
        message: Box<RawMessage>,
    },

    /// Every receiver is gone
    #[error("Ingress queue disconnected")]
    Disconnected,
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a bind error
    pub fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a framing error
    pub fn framing(message: impl Into<String>) -> Self {
        Self::Framing {
            message: message.into(),
        }
    }

    /// Create a task error
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}
