//! # Ingest Service
//!
//! Wires the pipeline together:
//!
//! ```text
//! clients ──TCP──▶ IngestServer ──▶ IngressQueue ──▶ consumer ──▶ RecordRouter ──▶ RecordSink
//! ```
//!
//! The mapping store is built once before the listener starts and shared
//! read-only with the consumer. The consumer polls the queue in batches and
//! backs off exponentially (1 ms up to 100 ms) while it is empty. A message
//! that cannot be routed is logged and skipped; ingestion carries on.
//!
//! [`IngestService::shutdown`] stops the listener first (every open
//! connection flushes into the queue), lets the consumer drain what is left,
//! then stops the consumer.

use crate::error::{Result, ServiceError};
use crate::sink::RecordSink;
use socket_config::{IngestSettings, MappingStore};
use socket_network::{IngestServer, IngressQueue, ServerConfig, ServerHandle, StatsSnapshot};
use socket_routing::{RecordRouter, RoutedRecord};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(100);
const BATCH_SIZE: usize = 256;

/// Consumer-side counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    routed: AtomicU64,
    unroutable: AtomicU64,
    sink_failures: AtomicU64,
}

impl ConsumerStats {
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn unroutable(&self) -> u64 {
        self.unroutable.load(Ordering::Relaxed)
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }
}

/// Running ingestion pipeline
#[derive(Debug)]
pub struct IngestService {
    server: ServerHandle,
    queue: IngressQueue,
    consumer: JoinHandle<()>,
    stop_consumer: watch::Sender<bool>,
    consumer_stats: Arc<ConsumerStats>,
}

impl IngestService {
    /// Start the listener and the consumer
    pub async fn start(
        settings: IngestSettings,
        store: MappingStore,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self> {
        let queue = IngressQueue::from_settings(&settings.queue);
        let router = RecordRouter::new(Arc::new(store), settings.routing.clone());
        let consumer_stats = Arc::new(ConsumerStats::default());
        let (stop_consumer, stop_rx) = watch::channel(false);

        info!(
            message_types = router.store().message_types().len(),
            domains = router.store().domain_topics().len(),
            "Mapping store ready"
        );

        let server = IngestServer::new(ServerConfig::from_settings(&settings), queue.clone())
            .start()
            .await?;

        let consumer = tokio::spawn(consume(
            queue.clone(),
            router,
            sink,
            Arc::clone(&consumer_stats),
            stop_rx,
        ));

        Ok(Self {
            server,
            queue,
            consumer,
            stop_consumer,
            consumer_stats,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn server_stats(&self) -> StatsSnapshot {
        self.server.stats()
    }

    pub fn consumer_stats(&self) -> &ConsumerStats {
        &self.consumer_stats
    }

    pub fn queue(&self) -> &IngressQueue {
        &self.queue
    }

    /// Stop accepting, drain the queue through the consumer and stop it
    pub async fn shutdown(self) -> Result<()> {
        self.server.stop().await?;
        info!(queued = self.queue.len(), "Listener stopped, draining queue");

        self.stop_consumer.send_replace(true);
        self.consumer.await.map_err(|e| ServiceError::Consumer {
            message: e.to_string(),
        })?;

        info!(
            routed = self.consumer_stats.routed(),
            unroutable = self.consumer_stats.unroutable(),
            sink_failures = self.consumer_stats.sink_failures(),
            "Ingest service stopped"
        );
        Ok(())
    }
}

async fn consume(
    queue: IngressQueue,
    router: RecordRouter,
    sink: Arc<dyn RecordSink>,
    stats: Arc<ConsumerStats>,
    stop: watch::Receiver<bool>,
) {
    let mut backoff = MIN_BACKOFF;

    loop {
        let batch = queue.poll_batch(BATCH_SIZE);
        if batch.is_empty() {
            // Queue drained; only now honour a stop request
            let stopping = *stop.borrow();
            if stopping {
                break;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        }
        backoff = MIN_BACKOFF;

        let mut routed: Vec<RoutedRecord> = Vec::with_capacity(batch.len());
        for message in &batch {
            match router.route(message) {
                Ok(record) => routed.push(record),
                Err(e) => {
                    stats.unroutable.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        connection_id = message.connection_id(),
                        bytes = message.len(),
                        error = %e,
                        "Skipping unroutable message"
                    );
                }
            }
        }

        if routed.is_empty() {
            continue;
        }

        let count = routed.len() as u64;
        match sink.send_batch(routed).await {
            Ok(result) => {
                stats.routed.fetch_add(result.delivered as u64, Ordering::Relaxed);
                stats
                    .sink_failures
                    .fetch_add(result.failed.len() as u64, Ordering::Relaxed);
                if !result.is_complete() {
                    warn!(failed = ?result.failed, total = result.total, "Sink refused records");
                }
                debug!(delivered = result.delivered, "Batch handed to sink");
            }
            Err(e) => {
                stats.sink_failures.fetch_add(count, Ordering::Relaxed);
                error!(records = count, error = %e, "Sink failed for batch");
            }
        }
    }

    debug!("Consumer stopped");
}
