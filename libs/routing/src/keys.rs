//! # Partition Key Derivation
//!
//! A partition key is the concatenation, with no separator, of the payload
//! values of every key field configured for the message type. Fields are
//! visited in the [`KeyFieldSet`]'s sorted order, so the same payload always
//! yields the same key for a given store.
//!
//! | Field value | Contribution |
//! |---|---|
//! | string | the string itself |
//! | number | its text exactly as sent (`42`, `1.50`, `1e3`) |
//! | bool | `true` or `false` |
//! | null, array, object | [`RoutingError::NonScalarKeyField`] |
//! | absent | [`RoutingError::MissingKeyField`] |

use crate::{Result, RoutingError};
use serde_json::Value;
use socket_config::{KeyFieldSet, MappingStore};

/// Derive the partition key for a payload of `message_type`
pub fn derive_key(payload: &Value, message_type: &str, store: &MappingStore) -> Result<String> {
    derive_key_with_fields(payload, message_type, store.key_fields_for(message_type))
}

/// Derive a key from an explicit field set
pub fn derive_key_with_fields(
    payload: &Value,
    message_type: &str,
    fields: &KeyFieldSet,
) -> Result<String> {
    let mut key = String::new();
    for field in fields {
        let value = payload
            .get(field)
            .ok_or_else(|| RoutingError::missing_key_field(message_type, field))?;
        append_scalar(&mut key, value, message_type, field)?;
    }
    Ok(key)
}

fn append_scalar(key: &mut String, value: &Value, message_type: &str, field: &str) -> Result<()> {
    let kind = match value {
        Value::String(s) => {
            key.push_str(s);
            return Ok(());
        }
        Value::Number(n) => {
            key.push_str(&n.to_string());
            return Ok(());
        }
        Value::Bool(b) => {
            key.push_str(if *b { "true" } else { "false" });
            return Ok(());
        }
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };

    Err(RoutingError::NonScalarKeyField {
        message_type: message_type.to_string(),
        field: field.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use socket_config::AppProperties;

    fn store() -> MappingStore {
        let props = AppProperties::parse("all.config.names=orderEvent,domain-topic-mapping\n");
        MappingStore::load(
            r#"{"orderEvent":"id,region","domain-topic-mapping":"us:orders-us,eu:orders-eu"}"#,
            &props,
        )
        .unwrap()
    }

    fn fields(names: &[&str]) -> KeyFieldSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_order_event_key() {
        let payload: Value = serde_json::from_str(r#"{"id":"42","region":"us"}"#).unwrap();
        assert_eq!(derive_key(&payload, "orderEvent", &store()).unwrap(), "42us");
    }

    #[test]
    fn test_missing_field_is_lookup_error() {
        let payload = json!({"id": "42"});
        let err = derive_key(&payload, "orderEvent", &store()).unwrap_err();
        assert!(err.is_lookup_error());
        match err {
            RoutingError::MissingKeyField { message_type, field } => {
                assert_eq!(message_type, "orderEvent");
                assert_eq!(field, "region");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_scalar_rendering() {
        let payload = json!({"a": 7, "b": true, "c": 1.5});
        let key = derive_key_with_fields(&payload, "t", &fields(&["a", "b", "c"])).unwrap();
        assert_eq!(key, "7true1.5");
    }

    #[test]
    fn test_numbers_keep_their_source_text() {
        let payload: Value =
            serde_json::from_str(r#"{"a":1.50,"b":12345678901234567890123,"c":1e3}"#).unwrap();
        let key = derive_key_with_fields(&payload, "t", &fields(&["a", "b", "c"])).unwrap();
        assert_eq!(key, "1.50123456789012345678901231e3");

        // Ids beyond u64 stay distinct
        let near: Value = serde_json::from_str(r#"{"b":12345678901234567890124}"#).unwrap();
        let far: Value = serde_json::from_str(r#"{"b":12345678901234567890123}"#).unwrap();
        assert_ne!(
            derive_key_with_fields(&near, "t", &fields(&["b"])).unwrap(),
            derive_key_with_fields(&far, "t", &fields(&["b"])).unwrap()
        );
    }

    #[test]
    fn test_non_scalar_fields_rejected() {
        for value in [json!(null), json!([1]), json!({"x": 1})] {
            let payload = json!({ "id": value });
            let err = derive_key_with_fields(&payload, "t", &fields(&["id"])).unwrap_err();
            assert!(matches!(err, RoutingError::NonScalarKeyField { .. }));
            assert!(!err.is_lookup_error());
        }
    }

    #[test]
    fn test_unregistered_type_and_empty_set_give_empty_key() {
        let payload = json!({"id": "42"});
        assert_eq!(derive_key(&payload, "unknown", &store()).unwrap(), "");
        assert_eq!(derive_key_with_fields(&payload, "t", &KeyFieldSet::new()).unwrap(), "");
    }

    #[test]
    fn test_non_object_payload_has_no_fields() {
        let err = derive_key_with_fields(&json!("text"), "t", &fields(&["id"])).unwrap_err();
        assert!(err.is_lookup_error());
    }

    proptest! {
        #[test]
        fn prop_key_is_deterministic_and_ordered(
            values in proptest::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9]{0,8}", 1..6)
        ) {
            let payload = Value::Object(
                values.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect()
            );
            let set: KeyFieldSet = values.keys().cloned().collect();

            let first = derive_key_with_fields(&payload, "t", &set).unwrap();
            let second = derive_key_with_fields(&payload, "t", &set).unwrap();
            prop_assert_eq!(&first, &second);

            let expected: String = values.values().cloned().collect();
            prop_assert_eq!(first, expected);
        }

        #[test]
        fn prop_fails_iff_a_declared_field_is_absent(
            present in proptest::collection::btree_set("[a-z]{1,4}", 0..5),
            declared in proptest::collection::btree_set("[a-z]{1,4}", 0..5),
        ) {
            let payload = Value::Object(
                present.iter().map(|k| (k.clone(), Value::String("v".into()))).collect()
            );
            let result = derive_key_with_fields(&payload, "t", &declared);
            let any_absent = declared.iter().any(|f| !present.contains(f));
            prop_assert_eq!(result.is_err(), any_absent);
        }
    }
}
