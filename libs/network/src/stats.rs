//! Listener counters
//!
//! Lock-free counters shared by the accept loop and every connection task.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    active: AtomicUsize,
    messages_enqueued: AtomicU64,
    messages_dropped: AtomicU64,
    bytes_received: AtomicU64,
    acks_written: AtomicU64,
    io_errors: AtomicU64,
}

/// Shared server counters
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: usize,
    pub messages_enqueued: u64,
    pub messages_dropped: u64,
    pub bytes_received: u64,
    pub acks_written: u64,
    pub io_errors: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted connection; the guard decrements the active count on drop
    pub(crate) fn connection_opened(&self) -> ActiveConnectionGuard {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        ActiveConnectionGuard {
            stats: self.clone(),
        }
    }

    #[inline]
    pub(crate) fn record_bytes(&self, bytes: usize) {
        self.inner
            .bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_ack(&self) {
        self.inner.acks_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_enqueued(&self) {
        self.inner.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.inner.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_io_error(&self) {
        self.inner.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.inner.accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections(),
            messages_enqueued: self.inner.messages_enqueued.load(Ordering::Relaxed),
            messages_dropped: self.inner.messages_dropped.load(Ordering::Relaxed),
            bytes_received: self.inner.bytes_received.load(Ordering::Relaxed),
            acks_written: self.inner.acks_written.load(Ordering::Relaxed),
            io_errors: self.inner.io_errors.load(Ordering::Relaxed),
        }
    }
}

/// Keeps a connection counted as active while alive
#[derive(Debug)]
pub(crate) struct ActiveConnectionGuard {
    stats: ServerStats,
}

impl Drop for ActiveConnectionGuard {
    fn drop(&mut self) {
        self.stats.inner.active.fetch_sub(1, Ordering::AcqRel);
    }
}
