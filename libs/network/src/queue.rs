//! # Ingress Queue
//!
//! The only hand-off point between connection tasks and the downstream
//! consumer. Any number of producers push; one logical consumer polls.
//!
//! - **Unbounded** (default): `push` never blocks and never fails.
//! - **Bounded**: once `capacity` messages are waiting, the configured
//!   [`OverflowPolicy`] decides between waiting for space, evicting the
//!   oldest entry, or handing the new message back to the caller.
//!
//! Messages from one connection keep their order. Nothing is ordered across
//! connections. The queue lives only in memory.

use crate::error::QueueError;
use crate::message::RawMessage;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use socket_config::{OverflowPolicyKind, QueueSettings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Behaviour of a bounded queue at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Producer waits for space
    Block,
    /// Oldest waiting message is discarded
    DropOldest,
    /// New message is returned to the producer
    Reject,
}

impl From<OverflowPolicyKind> for OverflowPolicy {
    fn from(kind: OverflowPolicyKind) -> Self {
        match kind {
            OverflowPolicyKind::Block => Self::Block,
            OverflowPolicyKind::DropOldest => Self::DropOldest,
            OverflowPolicyKind::Reject => Self::Reject,
        }
    }
}

/// How a successful push landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Enqueued after evicting this many older messages
    EvictedOldest(usize),
}

/// Cloneable handle to the shared ingress queue
#[derive(Debug, Clone)]
pub struct IngressQueue {
    tx: Sender<RawMessage>,
    rx: Receiver<RawMessage>,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    evicted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
}

impl IngressQueue {
    /// Queue without a capacity limit
    pub fn unbounded() -> Self {
        let (tx, rx) = unbounded();
        Self::from_parts(tx, rx, None, OverflowPolicy::Reject)
    }

    /// Queue holding at most `capacity` messages
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = bounded(capacity);
        Self::from_parts(tx, rx, Some(capacity), policy)
    }

    /// Build the queue described by the settings
    pub fn from_settings(settings: &QueueSettings) -> Self {
        let queue = match settings.capacity {
            Some(capacity) => Self::bounded(capacity, settings.overflow.into()),
            None => Self::unbounded(),
        };
        info!(capacity = ?queue.capacity, policy = ?queue.policy, "Created ingress queue");
        queue
    }

    fn from_parts(
        tx: Sender<RawMessage>,
        rx: Receiver<RawMessage>,
        capacity: Option<usize>,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            tx,
            rx,
            capacity,
            policy,
            evicted: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a completed message to the consumer side
    pub fn push(&self, message: RawMessage) -> Result<PushOutcome, QueueError> {
        let capacity = match self.capacity {
            None => {
                return self
                    .tx
                    .send(message)
                    .map(|_| PushOutcome::Enqueued)
                    .map_err(|_| QueueError::Disconnected)
            }
            Some(capacity) => capacity,
        };

        match self.policy {
            OverflowPolicy::Block => self
                .tx
                .send(message)
                .map(|_| PushOutcome::Enqueued)
                .map_err(|_| QueueError::Disconnected),
            OverflowPolicy::Reject => match self.tx.try_send(message) {
                Ok(()) => Ok(PushOutcome::Enqueued),
                Err(TrySendError::Full(message)) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        capacity,
                        connection_id = message.connection_id(),
                        bytes = message.len(),
                        "Ingress queue full, message rejected"
                    );
                    Err(QueueError::Full {
                        capacity,
                        message: Box::new(message),
                    })
                }
                Err(TrySendError::Disconnected(_)) => Err(QueueError::Disconnected),
            },
            OverflowPolicy::DropOldest => {
                let mut pending = message;
                let mut evicted = 0;
                loop {
                    match self.tx.try_send(pending) {
                        Ok(()) if evicted == 0 => return Ok(PushOutcome::Enqueued),
                        Ok(()) => return Ok(PushOutcome::EvictedOldest(evicted)),
                        Err(TrySendError::Full(message)) => {
                            pending = message;
                            if let Ok(oldest) = self.rx.try_recv() {
                                evicted += 1;
                                self.evicted.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    capacity,
                                    connection_id = oldest.connection_id(),
                                    bytes = oldest.len(),
                                    "Ingress queue full, oldest message dropped"
                                );
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
                    }
                }
            }
        }
    }

    /// Take the next message, or `None` when empty
    pub fn poll(&self) -> Option<RawMessage> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn poll_timeout(&self, timeout: Duration) -> Option<RawMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take up to `max` waiting messages without blocking
    pub fn poll_batch(&self, max: usize) -> Vec<RawMessage> {
        let batch: Vec<RawMessage> = self.rx.try_iter().take(max).collect();
        if !batch.is_empty() {
            debug!(batch = batch.len(), remaining = self.rx.len(), "Polled ingress batch");
        }
        batch
    }

    /// Whether `push` may block the calling thread
    pub fn may_block(&self) -> bool {
        self.capacity.is_some() && self.policy == OverflowPolicy::Block
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Messages discarded by the drop-oldest policy
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Messages refused by the reject policy
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Default for IngressQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
