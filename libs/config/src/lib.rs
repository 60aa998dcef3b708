//! # Socket Connector Configuration
//!
//! Startup-time configuration for the socket ingestion connector.
//!
//! ## Features
//!
//! - **Property documents**: `.properties` text holding the master list of
//!   message type ids and the listener settings ([`AppProperties`])
//! - **Layered settings**: defaults, property document and `SOCKET_*`
//!   environment variables merged into [`IngestSettings`]
//! - **Mapping Store**: per-message-type key fields and the domain to topic
//!   table ([`MappingStore`]), read-only once loaded
//!
//! ## Usage
//!
//! ```rust,no_run
//! use socket_config::{AppProperties, IngestSettings, MappingStore};
//!
//! let props = AppProperties::from_file("config/app.properties")?;
//! let settings = IngestSettings::from_properties(&props)?;
//! let store = MappingStore::load_files("config/domain.json", &props)?;
//!
//! let fields = store.key_fields_for("orderEvent");
//! let topic = store.topic_for_domain("us");
//! # Ok::<(), socket_config::ConfigError>(())
//! ```

pub mod constants;
pub mod error;
pub mod mapping;
pub mod properties;
pub mod settings;

// Re-export commonly used types
pub use error::{ConfigError, Result};
pub use mapping::{DomainTopicMap, KeyFieldSet, MappingStore};
pub use properties::AppProperties;
pub use settings::{
    dump_configuration, ConnectionSettings, FramingPolicyKind, FramingSettings, IngestSettings,
    OverflowPolicyKind, QueueSettings, RoutingSettings,
};
