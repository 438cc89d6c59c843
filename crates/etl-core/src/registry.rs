use crate::{Error, Result, SinkFactory, SourceFactory};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Maps the `type` keys of a pipeline configuration to the factories that
/// build extract sources and load sinks.
///
/// Lookups are exact: `csv` and `CSV` are different types.
#[derive(Default)]
pub struct Registry {
    sources: BTreeMap<String, Arc<dyn SourceFactory>>,
    sinks: BTreeMap<String, Arc<dyn SinkFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations replace earlier ones under the same type.
    pub fn register_source(&mut self, factory: Arc<dyn SourceFactory>) {
        let source_type = factory.name().to_string();
        if self.sources.insert(source_type.clone(), factory).is_some() {
            warn!("Source type '{}' registered twice, keeping the latest", source_type);
        }
    }

    pub fn register_sink(&mut self, factory: Arc<dyn SinkFactory>) {
        let sink_type = factory.name().to_string();
        if self.sinks.insert(sink_type.clone(), factory).is_some() {
            warn!("Sink type '{}' registered twice, keeping the latest", sink_type);
        }
    }

    pub fn source_factory(&self, source_type: &str) -> Result<Arc<dyn SourceFactory>> {
        self.sources.get(source_type).cloned().ok_or_else(|| {
            Error::Config(format!(
                "Unknown source type '{}' (available: {})",
                source_type,
                self.source_types().join(", ")
            ))
        })
    }

    pub fn sink_factory(&self, sink_type: &str) -> Result<Arc<dyn SinkFactory>> {
        self.sinks.get(sink_type).cloned().ok_or_else(|| {
            Error::Config(format!(
                "Unknown database type '{}' (available: {})",
                sink_type,
                self.sink_types().join(", ")
            ))
        })
    }

    /// Registered source types in alphabetical order.
    pub fn source_types(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// Registered sink types in alphabetical order.
    pub fn sink_types(&self) -> Vec<&str> {
        self.sinks.keys().map(String::as_str).collect()
    }
}
