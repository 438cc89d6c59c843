use crate::{ApiConfig, ApiSource};
use etl_core::{Error, Result, Source, SourceFactory};
use serde_json::Value;

pub struct ApiSourceFactory;

impl SourceFactory for ApiSourceFactory {
    fn name(&self) -> &str {
        "api"
    }

    fn create(&self, source_name: &str, config: Value) -> Result<Box<dyn Source>> {
        let config: ApiConfig = serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid API source '{}': {}", source_name, e)))?;
        Ok(Box::new(ApiSource::new(source_name, config)?))
    }
}
