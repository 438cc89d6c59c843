use async_trait::async_trait;
use etl_core::{Error, RecordSet, Result, Source, SourceStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonConfig {
    /// Path to the JSON document
    pub path: PathBuf,
}

pub struct JsonSource {
    name: String,
    config: JsonConfig,
    status: SourceStatus,
}

impl JsonSource {
    pub fn new(name: impl Into<String>, config: JsonConfig) -> Self {
        Self {
            name: name.into(),
            config,
            status: SourceStatus::default(),
        }
    }

    async fn read(&self) -> Result<RecordSet> {
        let path = &self.config.path;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("JSON file not found: {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let document: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            Error::InvalidSourceFormat(format!("Malformed JSON in {}: {}", path.display(), e))
        })?;
        RecordSet::from_json_value(&document)
    }
}

#[async_trait]
impl Source for JsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self, cancel: &CancellationToken) -> Result<RecordSet> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        info!("Extracting data from JSON: {}", self.config.path.display());
        self.status.attempts += 1;

        match self.read().await {
            Ok(records) => {
                info!("Successfully extracted {} records from JSON", records.row_count());
                self.status.records_fetched += records.row_count() as u64;
                Ok(records)
            }
            Err(e) => {
                error!("Error extracting JSON: {}", e);
                self.status.errors += 1;
                self.status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn status(&self) -> SourceStatus {
        self.status.clone()
    }
}
