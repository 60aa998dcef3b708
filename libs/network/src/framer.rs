//! # Connection Framer
//!
//! Turns the ordered chunks read from one connection into complete
//! [`RawMessage`]s. The framer owns the connection's [`ConnectionBuffer`] and a
//! [`BoundaryDetector`]; it never touches the socket. The connection task
//! reads, feeds [`ConnectionFramer::on_chunk`], writes the acknowledgement when
//! asked to and pushes completed messages to the ingress queue.
//!
//! ## Chunk Rules
//! - Non-empty chunks are appended in arrival order and must be acknowledged.
//! - Empty chunks add nothing and are not acknowledged.
//! - At end of input, [`ConnectionFramer::finish`] yields the trailing message
//!   (under the close policy: the whole buffer, even when empty).
//!
//! ## Counter Guard
//! The buffer keeps a running `u32` byte count. When it reaches
//! `i32::MAX - 5000` it is reset to zero and logged. Buffered bytes are kept.

use crate::framing::BoundaryDetector;
use crate::message::{ConnectionId, RawMessage};
use crate::{Result, TransportError};
use bytes::BytesMut;
use socket_config::constants::wire::COUNTER_HEADROOM;
use tracing::{debug, info, trace};

/// Running counter value at which the guard resets
pub const COUNTER_CEILING: u32 = i32::MAX as u32 - COUNTER_HEADROOM;

/// Bytes received so far for the message being assembled
#[derive(Debug)]
pub struct ConnectionBuffer {
    bytes: BytesMut,
    running_len: u32,
    chunks: u64,
    ceiling: u32,
}

impl ConnectionBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
            running_len: 0,
            chunks: 0,
            ceiling: COUNTER_CEILING,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_ceiling(ceiling: u32) -> Self {
        Self {
            ceiling,
            ..Self::with_capacity(0)
        }
    }

    /// Append a chunk. Returns `true` when the running counter was reset.
    pub fn append(&mut self, chunk: &[u8]) -> bool {
        self.bytes.extend_from_slice(chunk);
        self.chunks += 1;

        let added = u32::try_from(chunk.len()).unwrap_or(u32::MAX);
        self.running_len = self.running_len.saturating_add(added);
        if self.running_len >= self.ceiling {
            self.running_len = 0;
            return true;
        }
        false
    }

    /// Running byte count since the last reset
    pub fn running_len(&self) -> u32 {
        self.running_len
    }

    /// Non-empty chunks appended so far
    pub fn chunk_count(&self) -> u64 {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.bytes
    }

    /// Drop buffered bytes and reset the counter
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.running_len = 0;
    }
}

/// Result of feeding one chunk
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    /// Write the acknowledgement token back to the client
    pub ack: bool,
    /// Messages completed by this chunk, in order
    pub completed: Vec<RawMessage>,
}

/// Per-connection reassembly state
#[derive(Debug)]
pub struct ConnectionFramer {
    connection_id: ConnectionId,
    buffer: ConnectionBuffer,
    detector: Box<dyn BoundaryDetector>,
    max_message_bytes: Option<usize>,
    completed: u64,
}

impl ConnectionFramer {
    pub fn new(connection_id: ConnectionId, detector: Box<dyn BoundaryDetector>) -> Self {
        Self::with_buffer(connection_id, detector, ConnectionBuffer::with_capacity(0))
    }

    pub fn with_buffer(
        connection_id: ConnectionId,
        detector: Box<dyn BoundaryDetector>,
        buffer: ConnectionBuffer,
    ) -> Self {
        Self {
            connection_id,
            buffer,
            detector,
            max_message_bytes: None,
            completed: 0,
        }
    }

    /// Bound the bytes a single message may buffer
    pub fn with_max_message_bytes(mut self, max: Option<usize>) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// Feed one chunk in arrival order
    pub fn on_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutcome> {
        if chunk.is_empty() {
            trace!(connection_id = self.connection_id, "Empty chunk ignored");
            return Ok(ChunkOutcome::default());
        }

        if self.buffer.append(chunk) {
            info!(
                connection_id = self.connection_id,
                ceiling = self.buffer.ceiling,
                "Running byte counter reached its upper limit and was reset"
            );
        }

        debug!(
            connection_id = self.connection_id,
            chunk_bytes = chunk.len(),
            buffered = self.buffer.len(),
            running = self.buffer.running_len(),
            "Buffered chunk"
        );

        let mut outcome = ChunkOutcome {
            ack: true,
            completed: Vec::new(),
        };

        while let Some(frame) = self.detector.split(self.buffer.bytes_mut())? {
            self.completed += 1;
            outcome.completed.push(RawMessage::new(self.connection_id, frame));
        }

        if let Some(max) = self.max_message_bytes {
            if self.buffer.len() > max {
                let buffered = self.buffer.len();
                self.buffer.clear();
                return Err(TransportError::framing(format!(
                    "Buffered {} bytes without a message boundary (limit {})",
                    buffered, max
                )));
            }
        }

        Ok(outcome)
    }

    /// Complete the trailing message at end of input
    pub fn finish(&mut self) -> Option<RawMessage> {
        let trailing = self.detector.finish(self.buffer.bytes_mut());
        self.buffer.clear();

        trailing.map(|frame| {
            self.completed += 1;
            RawMessage::new(self.connection_id, frame)
        })
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Messages completed so far
    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    pub fn policy(&self) -> &'static str {
        self.detector.name()
    }
}
