//! End-to-end tests: config files on disk, real TCP clients, in-memory sink

use socket_ingest::{load_config, IngestService, MemorySink};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};

const APP_PROPERTIES: &str = "\
# test service
all.config.names=orderEvent,domain-topic-mapping
connection.host=127.0.0.1
connection.port=0
routing.default_topic=orders-other
";

const DOMAIN_JSON: &str =
    r#"{"orderEvent":"id,region","domain-topic-mapping":"us:orders-us,eu:orders-eu"}"#;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

async fn start_service(app: &Path, domain: &Path) -> (IngestService, MemorySink) {
    let loaded = load_config(app, domain).expect("config should load");
    let sink = MemorySink::new();
    let service = IngestService::start(loaded.settings, loaded.store, Arc::new(sink.clone()))
        .await
        .expect("service should start");
    (service, sink)
}

async fn send(addr: std::net::SocketAddr, chunks: &[&[u8]]) -> Vec<u8> {
    let mut client = TcpStream::connect(addr).await.unwrap();
    for chunk in chunks {
        client.write_all(chunk).await.unwrap();
        if !chunk.is_empty() {
            let mut ack = [0u8; 4];
            client.read_exact(&mut ack).await.unwrap();
        }
    }
    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    rest
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_chunked_order_event_is_routed() {
    let app = write_temp(APP_PROPERTIES);
    let domain = write_temp(DOMAIN_JSON);
    let (service, sink) = start_service(app.path(), domain.path()).await;

    send(
        service.local_addr(),
        &[
            b"{\"messageType\":\"orderEvent\",\"domain\":\"us\",\"id\":\"",
            b"42\",\"region\":\"us\"}",
        ],
    )
    .await;

    wait_until(|| sink.len() == 1).await;
    let record = &sink.records()[0];
    assert_eq!(record.key, "42us");
    assert_eq!(record.key_digest, socket_routing::digest("42us"));
    assert_eq!(record.topic, "orders-us");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_messages_do_not_stop_ingestion() {
    let app = write_temp(APP_PROPERTIES);
    let domain = write_temp(DOMAIN_JSON);
    let (service, sink) = start_service(app.path(), domain.path()).await;
    let addr = service.local_addr();

    // Empty message, non-JSON and a payload missing a key field
    send(addr, &[]).await;
    send(addr, &[b"not json"]).await;
    send(addr, &[b"{\"messageType\":\"orderEvent\",\"id\":\"1\"}"]).await;
    send(
        addr,
        &[b"{\"messageType\":\"orderEvent\",\"domain\":\"apac\",\"id\":\"7\",\"region\":\"ap\"}"],
    )
    .await;

    wait_until(|| sink.len() == 1).await;
    wait_until(|| service.consumer_stats().unroutable() == 3).await;

    let record = &sink.records()[0];
    assert_eq!(record.key, "7ap");
    assert_eq!(record.topic, "orders-other");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_open_connections() {
    let app = write_temp(APP_PROPERTIES);
    let domain = write_temp(DOMAIN_JSON);
    let (service, sink) = start_service(app.path(), domain.path()).await;

    // Leave the connection open; shutdown must flush it through the consumer
    let mut client = TcpStream::connect(service.local_addr()).await.unwrap();
    client
        .write_all(b"{\"messageType\":\"orderEvent\",\"domain\":\"eu\",\"id\":\"9\",\"region\":\"eu\"}")
        .await
        .unwrap();
    let mut ack = [0u8; 4];
    client.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, b"OK\r\n");

    service.shutdown().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].topic, "orders-eu");
    assert_eq!(records[0].key, "9eu");
}

#[test]
fn test_missing_domain_entry_aborts_startup() {
    let app = write_temp("all.config.names=orderEvent,refundEvent\n");
    let domain = write_temp(r#"{"orderEvent":"id"}"#);

    let err = load_config(app.path(), domain.path()).unwrap_err();
    assert!(err.to_string().contains("refundEvent"));
}
