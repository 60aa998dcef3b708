//! # Socket Message Routing
//!
//! Downstream half of the ingestion pipeline: everything that interprets a
//! payload after it leaves the ingress queue.
//!
//! - [`derive_key`]: partition key from the message type's key fields
//! - [`digest`]: 128-bit MD5 content hash as lowercase hex
//! - [`RecordRouter`]: payload parsing, key derivation and topic resolution
//!
//! ```rust
//! use serde_json::json;
//! use socket_config::{AppProperties, MappingStore};
//! use socket_routing::{derive_key, digest};
//!
//! let props = AppProperties::parse("all.config.names=orderEvent\n");
//! let store = MappingStore::load(r#"{"orderEvent":"id,region"}"#, &props)?;
//!
//! let key = derive_key(&json!({"id": "42", "region": "us"}), "orderEvent", &store)?;
//! assert_eq!(key, "42us");
//! assert_eq!(digest(&key).len(), 32);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod digest;
pub mod error;
pub mod keys;
pub mod router;

pub use digest::{digest, digest_bytes, DIGEST_HEX_LEN};
pub use error::{Result, RoutingError};
pub use keys::{derive_key, derive_key_with_fields};
pub use router::{add_fields, format_batch, RecordRouter, RoutedRecord};
