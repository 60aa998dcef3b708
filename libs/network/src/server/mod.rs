//! # TCP Ingest Server
//!
//! Accepts any number of concurrent client connections on one listening
//! address and spawns a [`connection`] task for each. Every task reassembles
//! its own messages and pushes them onto the shared [`IngressQueue`]; the
//! server never parses payloads.
//!
//! ## Lifecycle
//! - [`IngestServer::start`] binds before returning, so a returned
//!   [`ServerHandle`] is already accepting. No warm-up delay is needed.
//! - [`ServerHandle::stop`] stops accepting, asks every live connection to
//!   flush its buffer and waits up to the drain timeout before aborting
//!   stragglers. Messages already queued stay in the queue.
//! - Dropping the handle requests shutdown without waiting.
//!
//! ## Example
//! ```rust,no_run
//! use socket_network::{IngestServer, IngressQueue, ServerConfig};
//!
//! # async fn run() -> socket_network::Result<()> {
//! let queue = IngressQueue::unbounded();
//! let handle = IngestServer::new(ServerConfig::default(), queue.clone())
//!     .start()
//!     .await?;
//! println!("listening on {}", handle.local_addr());
//!
//! while let Some(message) = queue.poll() {
//!     println!("{} bytes from {}", message.len(), message.connection_id());
//! }
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;

use crate::message::ConnectionId;
use crate::queue::IngressQueue;
use crate::stats::{ServerStats, StatsSnapshot};
use crate::{Result, TransportError};
use connection::{serve_connection, shutdown_requested, ConnectionContext};
use socket_config::{FramingSettings, IngestSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub use connection::ConnectionEnd;

/// Listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to bind; port 0 picks a free port
    pub bind_address: String,
    pub read_buffer_bytes: usize,
    pub idle_timeout: Option<Duration>,
    pub drain_timeout: Duration,
    pub framing: FramingSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&IngestSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self {
            bind_address: settings.connection.bind_address(),
            read_buffer_bytes: settings.connection.read_buffer_bytes,
            idle_timeout: settings.connection.idle_timeout(),
            drain_timeout: settings.connection.drain_timeout(),
            framing: settings.framing.clone(),
        }
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_framing(mut self, framing: FramingSettings) -> Self {
        self.framing = framing;
        self
    }
}

/// Not-yet-started listener
#[derive(Debug)]
pub struct IngestServer {
    config: ServerConfig,
    queue: IngressQueue,
    stats: ServerStats,
}

impl IngestServer {
    pub fn new(config: ServerConfig, queue: IngressQueue) -> Self {
        Self {
            config,
            queue,
            stats: ServerStats::new(),
        }
    }

    /// Bind to all interfaces on `port` with default settings and start accepting
    pub async fn start_on_port(port: u16, queue: IngressQueue) -> Result<ServerHandle> {
        let config = ServerConfig::default().with_bind_address(format!("0.0.0.0:{}", port));
        Self::new(config, queue).start().await
    }

    /// Bind the listener and spawn the accept loop
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| TransportError::bind(self.config.bind_address.clone(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("Failed to read listener address", e))?;

        if self.config.idle_timeout.is_none() {
            warn!(
                address = %local_addr,
                "No idle timeout configured; silent clients hold their connection open indefinitely"
            );
        }

        let (shutdown_tx, _) = watch::channel(false);
        let drain_timeout = self.config.drain_timeout;
        let ctx = Arc::new(ConnectionContext {
            queue: self.queue,
            stats: self.stats.clone(),
            framing: self.config.framing,
            read_buffer_bytes: self.config.read_buffer_bytes,
            idle_timeout: self.config.idle_timeout,
            shutdown: shutdown_tx.clone(),
        });

        info!(
            address = %local_addr,
            policy = ?ctx.framing.policy,
            read_buffer_bytes = ctx.read_buffer_bytes,
            "Ingest server listening"
        );

        let accept_task = tokio::spawn(accept_loop(listener, ctx, drain_timeout));

        Ok(ServerHandle {
            local_addr,
            stats: self.stats,
            shutdown: shutdown_tx,
            accept_task: Some(accept_task),
        })
    }
}

enum AcceptEvent {
    Connection(std::io::Result<(TcpStream, SocketAddr)>),
    Finished(std::result::Result<ConnectionId, JoinError>),
    Shutdown,
}

/// Log a joined connection task, returning its id when it ran to completion
fn reap(joined: std::result::Result<ConnectionId, JoinError>) -> Option<ConnectionId> {
    match joined {
        Ok(id) => {
            debug!(connection_id = id, "Connection task joined");
            Some(id)
        }
        Err(e) if e.is_cancelled() => {
            debug!("Connection task aborted");
            None
        }
        Err(e) => {
            error!(error = %e, "Connection task panicked");
            None
        }
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ConnectionContext>, drain_timeout: Duration) {
    let mut next_id: ConnectionId = 1;
    let mut connections: JoinSet<ConnectionId> = JoinSet::new();
    let mut shutdown = ctx.shutdown.subscribe();

    loop {
        let event = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => AcceptEvent::Shutdown,
            accepted = listener.accept() => AcceptEvent::Connection(accepted),
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                AcceptEvent::Finished(joined)
            }
        };

        match event {
            AcceptEvent::Shutdown => break,
            AcceptEvent::Finished(joined) => {
                reap(joined);
            }
            AcceptEvent::Connection(Ok((stream, peer))) => {
                let connection_id = next_id;
                next_id += 1;
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(connection_id, error = %e, "Failed to set TCP_NODELAY");
                }

                let guard = ctx.stats.connection_opened();
                info!(
                    connection_id,
                    peer = %peer,
                    active = ctx.stats.active_connections(),
                    "Accepted connection"
                );

                let ctx = Arc::clone(&ctx);
                let rx = ctx.shutdown.subscribe();
                connections.spawn(async move {
                    let _guard = guard;
                    serve_connection(stream, connection_id, &ctx, rx).await;
                    connection_id
                });
            }
            AcceptEvent::Connection(Err(e)) => {
                ctx.stats.record_io_error();
                error!(error = %e, "Failed to accept connection");
                // Back off so a persistent error (e.g. fd exhaustion) does not spin
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    drop(listener);
    let pending = connections.len();
    info!(pending, "Listener closed, draining connections");

    let drained = tokio::time::timeout(drain_timeout, async {
        while let Some(joined) = connections.join_next().await {
            reap(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            timeout_ms = drain_timeout.as_millis() as u64,
            "Drain timeout elapsed, aborting connections"
        );
        connections.abort_all();
        while let Some(joined) = connections.join_next().await {
            reap(joined);
        }
    }

    info!(
        enqueued = ctx.stats.snapshot().messages_enqueued,
        queued = ctx.queue.len(),
        "Ingest server stopped"
    );
}

/// Running listener
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stats: ServerStats,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> usize {
        self.stats.active_connections()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting, flush live connections and wait for the listener to finish
    pub async fn stop(mut self) -> Result<()> {
        info!(address = %self.local_addr, "Stopping ingest server");
        self.shutdown.send_replace(true);

        match self.accept_task.take() {
            Some(task) => task
                .await
                .map_err(|e| TransportError::task(format!("Accept loop failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.accept_task.is_some() {
            self.shutdown.send_replace(true);
        }
    }
}
