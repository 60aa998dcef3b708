//! Socket Ingestion Transport
//!
//! TCP listener for the socket connector. Accepts many concurrent client
//! connections, reassembles each connection's chunks into complete messages,
//! acknowledges every non-empty chunk with `OK\r\n` and hands completed
//! messages to a shared in-memory [`IngressQueue`].
//!
//! Payloads are never interpreted here; routing and key derivation happen
//! downstream of the queue.

pub mod error;
pub mod framer;
pub mod framing;
pub mod message;
pub mod queue;
pub mod server;
pub mod stats;

// Re-export commonly used types
pub use error::{QueueError, Result, TransportError};
pub use framer::{ChunkOutcome, ConnectionBuffer, ConnectionFramer};
pub use framing::{detector_for, BoundaryDetector, ConnectionClose, Delimited, LengthPrefixed};
pub use message::{ConnectionId, RawMessage};
pub use queue::{IngressQueue, OverflowPolicy, PushOutcome};
pub use server::{ConnectionEnd, IngestServer, ServerConfig, ServerHandle};
pub use stats::{ServerStats, StatsSnapshot};
