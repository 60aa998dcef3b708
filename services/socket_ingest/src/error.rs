//! Service error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] socket_config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] socket_network::TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Consumer task failed: {message}")]
    Consumer { message: String },
}

/// Failure handing routed records to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink unavailable: {message}")]
    Unavailable { message: String },

    #[error("Record rejected by sink: {message}")]
    Rejected { message: String },
}

pub type Result<T> = std::result::Result<T, ServiceError>;
