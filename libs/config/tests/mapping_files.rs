//! Integration tests for loading the mapping store and settings from disk

use socket_config::constants::DOMAIN_TOPIC_MAPPING;
use socket_config::{AppProperties, ConfigError, IngestSettings, MappingStore};
use std::fs;
use tempfile::tempdir;

const DOMAIN_JSON: &str = r#"{
    "orderEvent": "id,region",
    "paymentEvent": "paymentId, currency ,merchant",
    "domain-topic-mapping": "us:orders-us,eu:orders-eu"
}"#;

const APP_PROPERTIES: &str = r#"
# Socket connector application configuration
all.config.names = orderEvent,paymentEvent,\
                   domain-topic-mapping
connection.port = 7070
"#;

#[test]
fn test_load_store_from_files() {
    let dir = tempdir().unwrap();
    let domain_path = dir.path().join("domain.json");
    let app_path = dir.path().join("app.properties");
    fs::write(&domain_path, DOMAIN_JSON).unwrap();
    fs::write(&app_path, APP_PROPERTIES).unwrap();

    let props = AppProperties::from_file(&app_path).unwrap();
    let store = MappingStore::load_files(&domain_path, &props).unwrap();

    assert_eq!(
        store.message_types(),
        &["orderEvent", "paymentEvent", DOMAIN_TOPIC_MAPPING]
    );
    let payment: Vec<&str> = store
        .key_fields_for("paymentEvent")
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(payment, vec!["currency", "merchant", "paymentId"]);
    assert_eq!(store.topic_for_domain("eu"), Some("orders-eu"));

    let settings = IngestSettings::from_properties_only(&props).unwrap();
    assert_eq!(settings.connection.port, 7070);
}

#[test]
fn test_loading_twice_is_identical() {
    let props = AppProperties::parse(APP_PROPERTIES);
    let first = MappingStore::load(DOMAIN_JSON, &props).unwrap();
    let second = MappingStore::load(DOMAIN_JSON, &props).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_document_key_order_is_irrelevant() {
    let reordered = r#"{
        "domain-topic-mapping": "eu:orders-eu,us:orders-us",
        "paymentEvent": "merchant,currency,paymentId",
        "orderEvent": "region,id"
    }"#;
    let props = AppProperties::parse(APP_PROPERTIES);

    let original = MappingStore::load(DOMAIN_JSON, &props).unwrap();
    let shuffled = MappingStore::load(reordered, &props).unwrap();

    assert_eq!(original.key_fields(), shuffled.key_fields());
    assert_eq!(original.domain_topics(), shuffled.domain_topics());
}

#[test]
fn test_missing_files_report_path() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.properties");

    match AppProperties::from_file(&missing) {
        Err(ConfigError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected Io error, got {:?}", other),
    }

    let props = AppProperties::parse(APP_PROPERTIES);
    assert!(matches!(
        MappingStore::load_files(dir.path().join("absent.json"), &props),
        Err(ConfigError::Io { .. })
    ));
}
