//! Destinations for routed records
//!
//! Forwarding into the messaging system lives behind [`RecordSink`]. The
//! service ships two implementations: [`LoggingSink`] for standalone runs and
//! [`MemorySink`] for tests and embedding.

use crate::error::SinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use socket_routing::{format_batch, RoutedRecord};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

/// Outcome of a batch hand-off
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub delivered: usize,
    /// Indices of records the sink refused
    pub failed: Vec<usize>,
}

impl BatchResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.delivered == self.total
    }
}

/// A destination for routed records
#[async_trait]
pub trait RecordSink: Send + Sync + Debug {
    /// Deliver one record
    async fn send(&self, record: RoutedRecord) -> Result<(), SinkError>;

    /// Deliver a batch, continuing past individual failures
    async fn send_batch(&self, records: Vec<RoutedRecord>) -> Result<BatchResult, SinkError> {
        let mut result = BatchResult::new(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match self.send(record).await {
                Ok(()) => result.delivered += 1,
                Err(_) => result.failed.push(index),
            }
        }
        Ok(result)
    }
}

/// Logs every batch at info level
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl RecordSink for LoggingSink {
    async fn send(&self, record: RoutedRecord) -> Result<(), SinkError> {
        info!(
            topic = %record.topic,
            key = %record.key,
            key_digest = %record.key_digest,
            message_type = %record.message_type,
            "Routed record"
        );
        Ok(())
    }

    async fn send_batch(&self, records: Vec<RoutedRecord>) -> Result<BatchResult, SinkError> {
        let total = records.len();
        info!(records = total, "Routed batch:\n{}", format_batch(&records));
        Ok(BatchResult {
            total,
            delivered: total,
            failed: Vec::new(),
        })
    }
}

/// Keeps every record in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<RoutedRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far
    pub fn records(&self) -> Vec<RoutedRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn send(&self, record: RoutedRecord) -> Result<(), SinkError> {
        self.records.lock().push(record);
        Ok(())
    }
}
