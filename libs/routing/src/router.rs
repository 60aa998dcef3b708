//! # Record Router
//!
//! Turns a [`RawMessage`] taken off the ingress queue into a [`RoutedRecord`]:
//! parsed payload, message type, partition key, key digest and destination
//! topic. The router only reads the [`MappingStore`]; one instance can be
//! shared freely between consumers.
//!
//! ## Resolution
//! 1. Parse the payload as a JSON object
//! 2. Read the message type from the configured field (`messageType`)
//! 3. Reject types missing from the master list
//! 4. Derive the key from the type's key fields and digest it
//! 5. Look the domain field (`domain`) up in the domain to topic map, falling
//!    back to the default topic

use crate::digest::digest;
use crate::keys::derive_key;
use crate::{Result, RoutingError};
use serde::Serialize;
use serde_json::{Map, Value};
use socket_config::{MappingStore, RoutingSettings};
use socket_network::{ConnectionId, RawMessage};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A message with everything needed to forward it downstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedRecord {
    pub connection_id: ConnectionId,
    pub message_type: String,
    pub topic: String,
    pub key: String,
    pub key_digest: String,
    pub payload: Value,
}

impl fmt::Display for RoutedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(
                f,
                "RoutedRecord(topic={}, key={}, type={})",
                self.topic, self.key, self.message_type
            ),
        }
    }
}

/// Resolves topics and partition keys for raw messages
#[derive(Debug, Clone)]
pub struct RecordRouter {
    store: Arc<MappingStore>,
    settings: RoutingSettings,
}

impl RecordRouter {
    pub fn new(store: Arc<MappingStore>, settings: RoutingSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    /// Route one message
    pub fn route(&self, message: &RawMessage) -> Result<RoutedRecord> {
        let connection_id = message.connection_id();
        let payload: Value = serde_json::from_slice(message.as_bytes()).map_err(|e| {
            RoutingError::invalid_payload(connection_id, "payload is not valid JSON", Some(e))
        })?;
        if !payload.is_object() {
            return Err(RoutingError::invalid_payload(
                connection_id,
                "payload is not a JSON object",
                None,
            ));
        }

        let message_type = payload
            .get(&self.settings.message_type_field)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RoutingError::MissingMessageType {
                connection_id,
                field: self.settings.message_type_field.clone(),
            })?
            .to_string();

        if !self.store.is_registered(&message_type) {
            return Err(RoutingError::UnknownMessageType { message_type });
        }

        let key = derive_key(&payload, &message_type, &self.store)?;
        let key_digest = digest(&key);
        let topic = self.resolve_topic(&payload)?;

        debug!(
            connection_id,
            message_type = %message_type,
            topic = %topic,
            key_digest = %key_digest,
            "Routed message"
        );

        Ok(RoutedRecord {
            connection_id,
            message_type,
            topic,
            key,
            key_digest,
            payload,
        })
    }

    fn resolve_topic(&self, payload: &Value) -> Result<String> {
        let domain = payload
            .get(&self.settings.domain_field)
            .and_then(Value::as_str);

        if let Some(topic) = domain.and_then(|d| self.store.topic_for_domain(d)) {
            return Ok(topic.to_string());
        }

        match &self.settings.default_topic {
            Some(topic) => {
                trace!(domain = ?domain, topic = %topic, "Using default topic");
                Ok(topic.clone())
            }
            None => Err(RoutingError::TopicNotFound {
                domain: domain.map(str::to_string),
            }),
        }
    }
}

/// Add string fields to a JSON object payload and return its serialized form.
///
/// Existing fields with the same name are overwritten.
pub fn add_fields(payload: &mut Value, fields: &BTreeMap<String, String>) -> Result<String> {
    let object: &mut Map<String, Value> = payload.as_object_mut().ok_or_else(|| {
        RoutingError::invalid_payload(0, "cannot add fields to a non-object payload", None)
    })?;
    for (name, value) in fields {
        object.insert(name.clone(), Value::String(value.clone()));
    }
    Ok(payload.to_string())
}

/// Render records one per line, each line newline-terminated
pub fn format_batch(records: &[RoutedRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use socket_config::AppProperties;

    fn router(default_topic: Option<&str>) -> RecordRouter {
        let props = AppProperties::parse("all.config.names=orderEvent,domain-topic-mapping\n");
        let store = MappingStore::load(
            r#"{"orderEvent":"id,region","domain-topic-mapping":"us:orders-us,eu:orders-eu"}"#,
            &props,
        )
        .unwrap();
        let settings = RoutingSettings {
            default_topic: default_topic.map(str::to_string),
            ..RoutingSettings::default()
        };
        RecordRouter::new(Arc::new(store), settings)
    }

    fn raw(body: &str) -> RawMessage {
        RawMessage::new(9, body.as_bytes().to_vec())
    }

    #[test]
    fn test_route_order_event() {
        let record = router(None)
            .route(&raw(r#"{"messageType":"orderEvent","domain":"eu","id":"42","region":"us"}"#))
            .unwrap();

        assert_eq!(record.connection_id, 9);
        assert_eq!(record.message_type, "orderEvent");
        assert_eq!(record.topic, "orders-eu");
        assert_eq!(record.key, "42us");
        assert_eq!(record.key_digest, digest("42us"));
    }

    #[test]
    fn test_default_topic_fallback() {
        let body = r#"{"messageType":"orderEvent","domain":"apac","id":"1","region":"x"}"#;
        assert!(matches!(
            router(None).route(&raw(body)),
            Err(RoutingError::TopicNotFound { domain: Some(ref d) }) if d == "apac"
        ));
        assert_eq!(router(Some("orders-misc")).route(&raw(body)).unwrap().topic, "orders-misc");
    }

    #[test]
    fn test_rejections() {
        let router = router(Some("fallback"));
        assert!(matches!(router.route(&raw("")), Err(RoutingError::InvalidPayload { .. })));
        assert!(matches!(router.route(&raw("[1,2]")), Err(RoutingError::InvalidPayload { .. })));
        assert!(matches!(
            router.route(&raw(r#"{"id":"1"}"#)),
            Err(RoutingError::MissingMessageType { .. })
        ));
        assert!(matches!(
            router.route(&raw(r#"{"messageType":"refund"}"#)),
            Err(RoutingError::UnknownMessageType { .. })
        ));
        assert!(router
            .route(&raw(r#"{"messageType":"orderEvent","id":"1"}"#))
            .unwrap_err()
            .is_lookup_error());
    }

    #[test]
    fn test_add_fields() {
        let mut payload = json!({"id": "42", "source": "old"});
        let mut fields = BTreeMap::new();
        fields.insert("source".to_string(), "socket".to_string());
        fields.insert("topic".to_string(), "orders-us".to_string());

        let text = add_fields(&mut payload, &fields).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, json!({"id": "42", "source": "socket", "topic": "orders-us"}));

        assert!(add_fields(&mut json!(3), &fields).is_err());
    }

    #[test]
    fn test_format_batch() {
        assert_eq!(format_batch(&[]), "");

        let router = router(None);
        let record = router
            .route(&raw(r#"{"messageType":"orderEvent","domain":"us","id":"1","region":"a"}"#))
            .unwrap();
        let batch = format_batch(&[record.clone(), record]);
        let lines: Vec<&str> = batch.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(batch.ends_with('\n'));

        let line: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(line["topic"], "orders-us");
        assert_eq!(line["key"], "1a");
    }
}
