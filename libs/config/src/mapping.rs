//! # Mapping Store - Message Type Keys and Domain Routing
//!
//! ## Purpose
//! Holds, for every recognised message type id, the set of payload fields whose
//! values compose its partition key, plus the domain to topic table used for
//! routing. Built once at startup from two documents and never mutated:
//!
//! - **Domain document** (JSON): `{"orderEvent": "id,region",
//!   "domain-topic-mapping": "us:orders-us,eu:orders-eu"}`
//! - **Property document**: `all.config.names = orderEvent,domain-topic-mapping`
//!
//! Only ids named in the master list are loaded; extra keys in the domain
//! document are ignored.
//!
//! ## Task Overrides
//!
//! Connector tasks may carry their own flat `String -> String` configuration.
//! [`MappingStore::with_overrides`] applies such a map to a *copy* of the store,
//! so every task sees its own view while the process-wide store stays intact.
//! [`MappingStore::to_task_config`] produces the map form of a store.
//!
//! ## Ordering
//!
//! Key field sets are `BTreeSet`s: the order in which fields are concatenated
//! into a key is lexicographic and identical for every load of the same
//! documents.

use crate::constants::{ALL_CONFIG_NAMES, DOMAIN_TOPIC_MAPPING};
use crate::properties::{split_list, AppProperties};
use crate::{ConfigError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Field names composing one message type's partition key
pub type KeyFieldSet = BTreeSet<String>;

/// Domain name to topic name
pub type DomainTopicMap = BTreeMap<String, String>;

static NO_FIELDS: KeyFieldSet = BTreeSet::new();

/// Read-only message type and routing mappings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    /// Master list, in declared order
    message_types: Vec<String>,
    key_fields: BTreeMap<String, KeyFieldSet>,
    domain_topics: DomainTopicMap,
}

impl MappingStore {
    /// Build the store from domain-document JSON text and the property document
    pub fn load(domain_json: &str, props: &AppProperties) -> Result<Self> {
        let document: Value = serde_json::from_str(domain_json)
            .map_err(|e| ConfigError::invalid_document("not valid JSON", Some(e)))?;
        Self::from_document(&document, props)
    }

    /// Read both documents from disk and build the store
    pub fn load_files<P: AsRef<Path>>(domain_path: P, props: &AppProperties) -> Result<Self> {
        let path = domain_path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let store = Self::load(&text, props)?;
        info!(path = %path.display(), "Loaded domain configuration");
        Ok(store)
    }

    /// Build the store from an already parsed domain document
    pub fn from_document(document: &Value, props: &AppProperties) -> Result<Self> {
        let entries = document
            .as_object()
            .ok_or_else(|| ConfigError::invalid_document("top level must be a JSON object", None))?;

        let message_types = props.message_type_ids()?;
        let mut store = Self {
            message_types: message_types.clone(),
            ..Self::default()
        };

        for message_type in &message_types {
            let raw = match entries.get(message_type) {
                Some(Value::String(raw)) => raw,
                Some(other) => {
                    return Err(ConfigError::invalid_value(
                        message_type,
                        format!("expected a comma-separated string, found {}", json_kind(other)),
                    ))
                }
                None => return Err(ConfigError::missing_domain_entry(message_type)),
            };

            store.apply_entry(message_type, &split_list(raw))?;
        }

        info!(
            message_types = store.message_types.len(),
            domains = store.domain_topics.len(),
            "Built mapping store"
        );
        Ok(store)
    }

    /// Key fields for a message type; empty when the type is unknown
    pub fn key_fields_for(&self, message_type: &str) -> &KeyFieldSet {
        self.key_fields.get(message_type).unwrap_or(&NO_FIELDS)
    }

    /// Topic configured for a domain
    pub fn topic_for_domain(&self, domain: &str) -> Option<&str> {
        self.domain_topics.get(domain).map(String::as_str)
    }

    /// Whether the id is in the master list
    pub fn is_registered(&self, message_type: &str) -> bool {
        self.message_types.iter().any(|id| id == message_type)
    }

    /// Master list in declared order
    pub fn message_types(&self) -> &[String] {
        &self.message_types
    }

    pub fn key_fields(&self) -> &BTreeMap<String, KeyFieldSet> {
        &self.key_fields
    }

    pub fn domain_topics(&self) -> &DomainTopicMap {
        &self.domain_topics
    }

    /// Fresh store with task-level overrides applied
    ///
    /// The master list comes from the override map's `all.config.names` when
    /// present. Ids whose override value is missing or empty keep the mapping
    /// copied from `self`, and an empty value for an id the copy lacks
    /// registers it with no key fields. Domain-topic pairs are merged over the
    /// copied table.
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> Result<Self> {
        let mut task_view = self.clone();

        if let Some(list) = overrides.get(ALL_CONFIG_NAMES) {
            task_view.message_types = split_list(list);
        }

        let message_types = task_view.message_types.clone();
        for message_type in &message_types {
            let values = match overrides.get(message_type) {
                Some(raw) => split_list(raw),
                None => continue,
            };
            if values.is_empty() {
                // An id the copied store never saw still registers with no key fields
                if message_type != DOMAIN_TOPIC_MAPPING
                    && !task_view.key_fields.contains_key(message_type)
                {
                    task_view.apply_entry(message_type, &values)?;
                } else {
                    debug!(message_type = %message_type, "Empty task override ignored");
                }
                continue;
            }
            task_view.apply_entry(message_type, &values)?;
        }

        debug!(
            overrides = overrides.len(),
            domains = task_view.domain_topics.len(),
            "Derived task mapping view"
        );
        Ok(task_view)
    }

    /// Flat map form accepted by [`with_overrides`](Self::with_overrides)
    pub fn to_task_config(&self) -> HashMap<String, String> {
        let mut map = HashMap::with_capacity(self.message_types.len() + 1);

        for message_type in &self.message_types {
            let value = if message_type == DOMAIN_TOPIC_MAPPING {
                self.domain_topics
                    .iter()
                    .map(|(domain, topic)| format!("{}:{}", domain, topic))
                    .collect::<Vec<_>>()
                    .join(",")
            } else {
                self.key_fields_for(message_type)
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            map.insert(message_type.clone(), value);
        }

        map.insert(ALL_CONFIG_NAMES.to_string(), self.message_types.join(","));
        map
    }

    fn apply_entry(&mut self, message_type: &str, values: &[String]) -> Result<()> {
        if message_type == DOMAIN_TOPIC_MAPPING {
            for entry in values {
                let (domain, topic) = parse_pair(entry)?;
                if let Some(previous) = self.domain_topics.insert(domain.clone(), topic.clone()) {
                    if previous != topic {
                        warn!(domain = %domain, %previous, %topic, "Domain topic remapped");
                    }
                }
            }
            return Ok(());
        }

        let fields: KeyFieldSet = values.iter().cloned().collect();
        if fields.is_empty() {
            warn!(message_type, "Message type declares no key fields");
        }
        self.key_fields.insert(message_type.to_string(), fields);
        Ok(())
    }
}

/// Split `domain:topic` on the first separator
fn parse_pair(entry: &str) -> Result<(String, String)> {
    match entry.split_once(':') {
        Some((domain, topic)) if !domain.trim().is_empty() && !topic.trim().is_empty() => {
            Ok((domain.trim().to_string(), topic.trim().to_string()))
        }
        _ => Err(ConfigError::malformed_pair(entry)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
