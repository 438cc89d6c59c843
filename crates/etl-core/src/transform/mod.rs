//! Ordered cleaning, validation and enrichment of one record set.
//!
//! The steps always run in the same sequence:
//! clean, standardize dates, convert types, check required columns,
//! deduplicate, audit nulls, enrich, final validation.

mod clean;
mod convert;
mod dates;
mod enrich;
mod quality;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{PipelineConfig, QualityConfig, TransformConfig};
use crate::profile::DataProfile;
use crate::record_set::{Column, RecordSet};
use crate::Result;

pub use clean::normalize_column_name;
pub use dates::parse_datetime;
pub use enrich::PROCESSED_AT_COLUMN;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransformStep {
    Clean,
    StandardizeDates,
    ConvertTypes,
    Deduplicate,
    NullAudit,
}

/// A non-fatal observation made while transforming.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransformNote {
    pub step: TransformStep,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub notes: Vec<TransformNote>,
    pub duplicates_removed: usize,
}

impl TransformReport {
    /// Record a note and surface it as a warning.
    fn warn(&mut self, step: TransformStep, message: String) {
        warn!(step = ?step, "{}", message);
        self.notes.push(TransformNote { step, message });
    }

    pub fn is_clean(&self) -> bool {
        self.notes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub records: RecordSet,
    pub report: TransformReport,
}

/// The fixed transformation sequence, built once from configuration.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    rules: TransformConfig,
    quality: QualityConfig,
}

impl TransformPipeline {
    pub fn new(rules: TransformConfig, quality: QualityConfig) -> Self {
        Self { rules, quality }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.transformations.clone(), config.quality.clone())
    }

    /// Transform `input`, discarding the notes.
    ///
    /// Fails only with `MissingColumns` or `EmptyResult`. The input is never
    /// modified.
    pub fn transform(&self, input: &RecordSet) -> Result<RecordSet> {
        self.run(input).map(|output| output.records)
    }

    /// Transform `input` and return the notes gathered along the way.
    pub fn run(&self, input: &RecordSet) -> Result<TransformOutput> {
        info!("Starting transformation. Input records: {}", input.row_count());

        let mut records = input.clone();
        let mut report = TransformReport::default();

        clean::clean(&mut records, &mut report);
        dates::standardize(&mut records, &self.rules.date_columns, &mut report);
        convert::convert_types(&mut records, &self.rules.data_types, &mut report);
        quality::require_columns(&records, &self.rules.required_columns)?;
        if !self.quality.allow_duplicates {
            records = quality::deduplicate(records, &mut report);
        }
        quality::audit_nulls(&records, self.quality.max_null_percentage, &mut report);
        enrich::enrich(&mut records, &self.rules.enrichment, Utc::now().naive_utc())?;
        if self.quality.validate_schema {
            quality::validate_final(&records, &self.rules.required_columns)?;
            info!("Data quality validation passed");
        }

        info!("Transformation complete. Output records: {}", records.row_count());
        Ok(TransformOutput { records, report })
    }

    pub fn profile(&self, records: &RecordSet) -> DataProfile {
        DataProfile::of(records)
    }
}

/// Swap in a rebuilt column of the same name and length.
fn replace_column(records: &mut RecordSet, column: Column) {
    if let Some(slot) = records
        .columns_mut()
        .iter_mut()
        .find(|c| c.name() == column.name())
    {
        *slot = column;
    }
}
