use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{Error, Registry, Result};

/// Configuration for one pipeline run. Loaded once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: RunSettings,

    /// Sources keyed by name; processed in key order
    pub sources: BTreeMap<String, SourceConfig>,

    #[serde(default)]
    pub transformations: TransformConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    /// Sink connection settings
    pub database: SinkConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Name used in logs and the run summary
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    #[serde(default)]
    pub error_handling: ErrorHandling,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file, written in addition to the console
    #[serde(default)]
    pub log_file: Option<String>,

    /// JSON formatted logs
    #[serde(default)]
    pub log_json: bool,
}

fn default_pipeline_name() -> String {
    "etl-pipeline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            error_handling: ErrorHandling::default(),
            log_level: default_log_level(),
            log_file: None,
            log_json: false,
        }
    }
}

/// How transform and load failures are treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandling {
    /// Abort the whole run on the first failure
    #[default]
    Rollback,
    /// Drop the failing source and carry on
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Type of the source (e.g., "csv", "json", "api")
    #[serde(rename = "type")]
    pub source_type: String,

    /// Source-specific configuration
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Type of the sink (e.g., "sqlite", "postgresql")
    #[serde(rename = "type")]
    pub sink_type: String,

    /// Sink-specific configuration
    #[serde(default)]
    pub config: Value,
}

/// Target type of a configured column conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Integer,
    Float,
    String,
    #[serde(alias = "date-time")]
    Datetime,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TargetType::Integer => "integer",
            TargetType::Float => "float",
            TargetType::String => "string",
            TargetType::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransformConfig {
    #[serde(default)]
    pub required_columns: Vec<String>,

    /// Column name to target type; applied in name order
    #[serde(default)]
    pub data_types: BTreeMap<String, TargetType>,

    #[serde(default)]
    pub date_columns: Vec<String>,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_quantity_column")]
    pub quantity_column: String,

    #[serde(default = "default_price_column")]
    pub price_column: String,

    #[serde(default = "default_total_column")]
    pub total_column: String,
}

fn default_quantity_column() -> String {
    "quantity".to_string()
}

fn default_price_column() -> String {
    "price".to_string()
}

fn default_total_column() -> String {
    "total_amount".to_string()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            quantity_column: default_quantity_column(),
            price_column: default_price_column(),
            total_column: default_total_column(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Largest tolerated null fraction per column, in `[0, 1]`
    #[serde(default = "default_max_null_percentage")]
    pub max_null_percentage: f64,

    #[serde(default)]
    pub allow_duplicates: bool,

    /// Run the final empty/required-column validation
    #[serde(default = "default_true")]
    pub validate_schema: bool,
}

fn default_max_null_percentage() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_null_percentage: default_max_null_percentage(),
            allow_duplicates: false,
            validate_schema: true,
        }
    }
}

/// Sink persistence policy for a table that may already exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Replace,
    Fail,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
            WriteMode::Fail => "fail",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Base table name; suffixed with the source name when several sources load
    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default)]
    pub write_mode: WriteMode,
}

fn default_table_name() -> String {
    "orders".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            write_mode: WriteMode::default(),
        }
    }
}

impl PipelineConfig {
    /// Semantic checks that deserialization cannot express.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::Config("At least one source must be configured".to_string()));
        }

        // Building each collaborator checks its own settings without touching I/O
        for (name, source) in &self.sources {
            let factory = registry.source_factory(&source.source_type).map_err(|_| {
                Error::Config(format!(
                    "Source '{}' has unknown type '{}'",
                    name, source.source_type
                ))
            })?;
            factory.create(name, source.config.clone()).map_err(|e| {
                Error::Config(format!("Source '{}' is misconfigured: {}", name, e))
            })?;
        }

        registry
            .sink_factory(&self.database.sink_type)?
            .create(self.database.config.clone())
            .map_err(|e| Error::Config(format!("Database is misconfigured: {}", e)))?;

        if self.output.table_name.trim().is_empty() {
            return Err(Error::Config("output.table_name must not be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&self.quality.max_null_percentage) {
            return Err(Error::Config(format!(
                "quality.max_null_percentage must be within [0, 1], got {}",
                self.quality.max_null_percentage
            )));
        }

        if let Some(blank) = self
            .transformations
            .required_columns
            .iter()
            .find(|c| c.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "transformations.required_columns contains a blank entry: '{}'",
                blank
            )));
        }

        Ok(())
    }
}
