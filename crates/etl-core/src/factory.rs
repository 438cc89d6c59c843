use crate::{Result, Sink, Source};
use serde_json::Value;

/// Factory trait for creating sources
pub trait SourceFactory: Send + Sync {
    /// Get the type identifier for this source (e.g., "csv")
    fn name(&self) -> &str;

    /// Create a new source instance from its configuration.
    ///
    /// Must not perform I/O; configuration validation relies on that.
    fn create(&self, source_name: &str, config: Value) -> Result<Box<dyn Source>>;
}

/// Factory trait for creating sinks
pub trait SinkFactory: Send + Sync {
    /// Get the type identifier for this sink (e.g., "sqlite")
    fn name(&self) -> &str;

    /// Create a new, unconnected sink instance from configuration
    fn create(&self, config: Value) -> Result<Box<dyn Sink>>;
}
