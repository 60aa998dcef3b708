//! Raw ingress messages
//!
//! A [`RawMessage`] is one reassembled client transmission. Nothing about its
//! contents is interpreted at this layer.

use bytes::Bytes;

/// Identifier assigned to each accepted connection
pub type ConnectionId = u64;

/// One fully reassembled, unparsed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    connection_id: ConnectionId,
    payload: Bytes,
}

impl RawMessage {
    pub fn new(connection_id: ConnectionId, payload: impl Into<Bytes>) -> Self {
        Self {
            connection_id,
            payload: payload.into(),
        }
    }

    /// Connection the payload arrived on
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
