use crate::{CsvConfig, CsvSource, JsonConfig, JsonSource};
use etl_core::{Error, Result, Source, SourceFactory};
use serde_json::Value;

pub struct CsvSourceFactory;

impl SourceFactory for CsvSourceFactory {
    fn name(&self) -> &str {
        "csv"
    }

    fn create(&self, source_name: &str, config: Value) -> Result<Box<dyn Source>> {
        let config: CsvConfig = serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid CSV source '{}': {}", source_name, e)))?;
        config.validate()?;
        Ok(Box::new(CsvSource::new(source_name, config)))
    }
}

pub struct JsonSourceFactory;

impl SourceFactory for JsonSourceFactory {
    fn name(&self) -> &str {
        "json"
    }

    fn create(&self, source_name: &str, config: Value) -> Result<Box<dyn Source>> {
        let config: JsonConfig = serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid JSON source '{}': {}", source_name, e)))?;
        Ok(Box::new(JsonSource::new(source_name, config)))
    }
}
