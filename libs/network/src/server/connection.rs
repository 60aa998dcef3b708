//! # Connection Handling
//!
//! One task per accepted connection. The task owns the connection's framer
//! and buffer outright; the ingress queue is the only shared state it touches.
//!
//! ## Loop
//! 1. Wait for the next chunk (bounded by the idle timeout, when configured)
//!    or for server shutdown
//! 2. Feed the chunk to the framer; write `OK\r\n` for every non-empty chunk
//! 3. Push messages the framer completed
//! 4. On end of input, idle timeout or shutdown, flush the trailing message
//!
//! Read errors end the connection (the buffer is still flushed). Ack write
//! errors are logged and reading continues. Nothing here can fail another
//! connection or the listener.

use crate::framer::ConnectionFramer;
use crate::framing;
use crate::message::{ConnectionId, RawMessage};
use crate::queue::IngressQueue;
use crate::stats::ServerStats;
use socket_config::constants::wire::ACK_TOKEN;
use socket_config::FramingSettings;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Settings and shared handles every connection task needs
#[derive(Debug)]
pub(crate) struct ConnectionContext {
    pub(crate) queue: IngressQueue,
    pub(crate) stats: ServerStats,
    pub(crate) framing: FramingSettings,
    pub(crate) read_buffer_bytes: usize,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) shutdown: watch::Sender<bool>,
}

/// Why a connection task stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Client closed or half-closed its side
    Closed,
    /// No data for the configured idle timeout
    IdleTimeout,
    /// Server is stopping
    Shutdown,
    /// Socket read failed
    ReadError,
    /// Framing limit exceeded; buffer dropped
    FramingError,
}

/// Resolves once shutdown has been requested (or the sender is gone)
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

enum ReadEvent {
    Data(io::Result<usize>),
    Idle,
    Shutdown,
}

async fn read_chunk<S>(io: &mut S, buf: &mut [u8], idle: Option<Duration>) -> ReadEvent
where
    S: AsyncRead + Unpin,
{
    match idle {
        Some(limit) => match tokio::time::timeout(limit, io.read(buf)).await {
            Ok(read) => ReadEvent::Data(read),
            Err(_) => ReadEvent::Idle,
        },
        None => ReadEvent::Data(io.read(buf).await),
    }
}

/// Drive one connection until it ends
pub(crate) async fn serve_connection<S>(
    mut io: S,
    connection_id: ConnectionId,
    ctx: &ConnectionContext,
    mut shutdown: watch::Receiver<bool>,
) -> ConnectionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = ConnectionFramer::new(connection_id, framing::detector_for(&ctx.framing))
        .with_max_message_bytes(ctx.framing.max_message_bytes);
    let mut read_buf = vec![0u8; ctx.read_buffer_bytes];

    let end = loop {
        let event = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => ReadEvent::Shutdown,
            event = read_chunk(&mut io, &mut read_buf, ctx.idle_timeout) => event,
        };

        let n = match event {
            ReadEvent::Data(Ok(0)) => {
                debug!(connection_id, "Client finished sending");
                break ConnectionEnd::Closed;
            }
            ReadEvent::Data(Ok(n)) => n,
            ReadEvent::Data(Err(e)) => {
                ctx.stats.record_io_error();
                warn!(connection_id, error = %e, "Read failed, closing connection");
                break ConnectionEnd::ReadError;
            }
            ReadEvent::Idle => {
                info!(
                    connection_id,
                    buffered = framer.buffered_len(),
                    "Connection idle past timeout, flushing"
                );
                break ConnectionEnd::IdleTimeout;
            }
            ReadEvent::Shutdown => {
                debug!(connection_id, buffered = framer.buffered_len(), "Shutdown requested");
                break ConnectionEnd::Shutdown;
            }
        };

        ctx.stats.record_bytes(n);
        let outcome = match framer.on_chunk(&read_buf[..n]) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(connection_id, error = %e, "Dropping buffered bytes");
                break ConnectionEnd::FramingError;
            }
        };

        if outcome.ack {
            match write_ack(&mut io).await {
                Ok(()) => ctx.stats.record_ack(),
                Err(e) => {
                    ctx.stats.record_io_error();
                    warn!(connection_id, error = %e, "Failed to write acknowledgement");
                }
            }
        }

        for message in outcome.completed {
            deliver(ctx, message).await;
        }
    };

    if end != ConnectionEnd::FramingError {
        if let Some(message) = framer.finish() {
            deliver(ctx, message).await;
        }
    }

    if let Err(e) = io.shutdown().await {
        debug!(connection_id, error = %e, "Error shutting down connection");
    }

    info!(
        connection_id,
        ?end,
        messages = framer.completed_count(),
        policy = framer.policy(),
        "Connection finished"
    );
    end
}

async fn write_ack<S>(io: &mut S) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    io.write_all(ACK_TOKEN).await?;
    io.flush().await
}

async fn deliver(ctx: &ConnectionContext, message: RawMessage) {
    let connection_id = message.connection_id();
    let bytes = message.len();

    let pushed = if ctx.queue.may_block() {
        let queue = ctx.queue.clone();
        match tokio::task::spawn_blocking(move || queue.push(message)).await {
            Ok(pushed) => pushed,
            Err(e) => {
                ctx.stats.record_dropped();
                error!(connection_id, error = %e, "Blocking enqueue task failed");
                return;
            }
        }
    } else {
        ctx.queue.push(message)
    };

    match pushed {
        Ok(outcome) => {
            ctx.stats.record_enqueued();
            info!(
                connection_id,
                bytes,
                queued = ctx.queue.len(),
                ?outcome,
                "Message enqueued"
            );
        }
        Err(e) => {
            ctx.stats.record_dropped();
            warn!(connection_id, bytes, error = %e, "Message not enqueued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;
    use socket_config::FramingPolicyKind;
    use tokio_test::io::Builder;

    fn context(queue: IngressQueue, framing: FramingSettings) -> ConnectionContext {
        ConnectionContext {
            queue,
            stats: ServerStats::new(),
            framing,
            read_buffer_bytes: 1024,
            idle_timeout: None,
            shutdown: watch::channel(false).0,
        }
    }

    #[tokio::test]
    async fn test_acks_each_chunk_and_enqueues_on_close() {
        let queue = IngressQueue::unbounded();
        let ctx = context(queue.clone(), FramingSettings::default());
        let mock = Builder::new()
            .read(b"{\"id\":\"")
            .write(ACK_TOKEN)
            .read(b"42\",\"region\":\"us\"}")
            .write(ACK_TOKEN)
            .build();

        let end = serve_connection(mock, 1, &ctx, ctx.shutdown.subscribe()).await;

        assert_eq!(end, ConnectionEnd::Closed);
        let message = queue.poll().unwrap();
        assert_eq!(message.as_bytes(), b"{\"id\":\"42\",\"region\":\"us\"}");
        assert!(queue.poll().is_none());

        let stats = ctx.stats.snapshot();
        assert_eq!(stats.acks_written, 2);
        assert_eq!(stats.messages_enqueued, 1);
    }

    #[tokio::test]
    async fn test_immediate_close_enqueues_empty_message_without_ack() {
        let queue = IngressQueue::unbounded();
        let ctx = context(queue.clone(), FramingSettings::default());
        let mock = Builder::new().build();

        let end = serve_connection(mock, 2, &ctx, ctx.shutdown.subscribe()).await;

        assert_eq!(end, ConnectionEnd::Closed);
        assert!(queue.poll().unwrap().is_empty());
        assert_eq!(ctx.stats.snapshot().acks_written, 0);
    }

    #[tokio::test]
    async fn test_read_error_still_flushes_buffer() {
        let queue = IngressQueue::unbounded();
        let ctx = context(queue.clone(), FramingSettings::default());
        let mock = Builder::new()
            .read(b"partial")
            .write(ACK_TOKEN)
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let end = serve_connection(mock, 3, &ctx, ctx.shutdown.subscribe()).await;

        assert_eq!(end, ConnectionEnd::ReadError);
        assert_eq!(queue.poll().unwrap().as_bytes(), b"partial");
        assert_eq!(ctx.stats.snapshot().io_errors, 1);
    }

    #[tokio::test]
    async fn test_failed_ack_does_not_close_connection() {
        let queue = IngressQueue::unbounded();
        let ctx = context(queue.clone(), FramingSettings::default());
        let mock = Builder::new()
            .read(b"one")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .read(b"two")
            .write(ACK_TOKEN)
            .build();

        let end = serve_connection(mock, 4, &ctx, ctx.shutdown.subscribe()).await;

        assert_eq!(end, ConnectionEnd::Closed);
        assert_eq!(queue.poll().unwrap().as_bytes(), b"onetwo");
        let stats = ctx.stats.snapshot();
        assert_eq!(stats.io_errors, 1);
        assert_eq!(stats.acks_written, 1);
    }

    #[tokio::test]
    async fn test_delimited_connection_yields_several_messages() {
        let queue = IngressQueue::unbounded();
        let framing = FramingSettings {
            policy: FramingPolicyKind::Delimiter,
            ..FramingSettings::default()
        };
        let ctx = context(queue.clone(), framing);
        let mock = Builder::new()
            .read(b"{\"a\":1}\n{\"a\"")
            .write(ACK_TOKEN)
            .read(b":2}\n")
            .write(ACK_TOKEN)
            .build();

        serve_connection(mock, 5, &ctx, ctx.shutdown.subscribe()).await;

        let payloads: Vec<_> = queue.poll_batch(10).into_iter().map(|m| m.into_payload()).collect();
        assert_eq!(payloads, vec![&b"{\"a\":1}"[..], &b"{\"a\":2}"[..]]);
    }

    #[tokio::test]
    async fn test_framing_limit_drops_buffer() {
        let queue = IngressQueue::unbounded();
        let framing = FramingSettings {
            max_message_bytes: Some(4),
            ..FramingSettings::default()
        };
        let ctx = context(queue.clone(), framing);
        let mock = Builder::new().read(b"too long").build();

        let end = serve_connection(mock, 6, &ctx, ctx.shutdown.subscribe()).await;

        assert_eq!(end, ConnectionEnd::FramingError);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_message_is_counted() {
        let queue = IngressQueue::bounded(1, OverflowPolicy::Reject);
        queue.push(RawMessage::new(0, &b"occupying"[..])).unwrap();
        let ctx = context(queue.clone(), FramingSettings::default());
        let mock = Builder::new().read(b"x").write(ACK_TOKEN).build();

        serve_connection(mock, 7, &ctx, ctx.shutdown.subscribe()).await;

        assert_eq!(ctx.stats.snapshot().messages_dropped, 1);
        assert_eq!(queue.len(), 1);
    }
}
