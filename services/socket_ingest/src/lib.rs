//! Socket ingestion service
//!
//! Library half of the `socket-ingest` binary: configuration loading,
//! pipeline wiring and the [`RecordSink`] seam for downstream forwarding.

pub mod error;
pub mod service;
pub mod sink;

pub use error::{Result, ServiceError, SinkError};
pub use service::{ConsumerStats, IngestService};
pub use sink::{BatchResult, LoggingSink, MemorySink, RecordSink};

use socket_config::{AppProperties, IngestSettings, MappingStore};
use std::path::Path;
use tracing::info;

/// Everything needed to start the service, resolved from disk
#[derive(Debug)]
pub struct LoadedConfig {
    pub properties: AppProperties,
    pub settings: IngestSettings,
    pub store: MappingStore,
}

/// Read the property document and the domain document.
///
/// Any failure here is fatal: the listener must not start without a
/// complete mapping store.
pub fn load_config(app_config: &Path, domain_config: &Path) -> Result<LoadedConfig> {
    let properties = AppProperties::from_file(app_config)?;
    let settings = IngestSettings::from_properties(&properties)?;
    let store = MappingStore::load_files(domain_config, &properties)?;

    info!(
        app_config = %app_config.display(),
        domain_config = %domain_config.display(),
        message_types = store.message_types().len(),
        "Configuration loaded"
    );

    Ok(LoadedConfig {
        properties,
        settings,
        store,
    })
}
