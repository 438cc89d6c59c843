use tracing::{debug, info};

use super::{TransformNote, TransformReport, TransformStep};
use crate::record_set::RecordSet;
use crate::{Error, Result};

/// Fail with every configured column the record set lacks, in config order.
pub(super) fn require_columns(records: &RecordSet, required: &[String]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !records.has_column(name))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(Error::MissingColumns(missing));
    }

    debug!("All required columns present: {:?}", required);
    Ok(())
}

/// Drop rows repeating an earlier row across all columns.
pub(super) fn deduplicate(records: RecordSet, report: &mut TransformReport) -> RecordSet {
    let mask = records.duplicate_mask();
    let removed = mask.iter().filter(|duplicate| **duplicate).count();
    if removed == 0 {
        return records;
    }

    info!("Removed {} duplicate records", removed);
    report.duplicates_removed += removed;
    report.notes.push(TransformNote {
        step: TransformStep::Deduplicate,
        message: format!("Removed {} duplicate record(s)", removed),
    });

    let keep: Vec<bool> = mask.iter().map(|duplicate| !duplicate).collect();
    records.filter_rows(&keep)
}

/// Warn about columns whose null fraction exceeds `threshold`.
pub(super) fn audit_nulls(records: &RecordSet, threshold: f64, report: &mut TransformReport) {
    let rows = records.row_count();
    if rows == 0 {
        return;
    }

    for column in records.columns() {
        let fraction = column.null_count() as f64 / rows as f64;
        if fraction > threshold {
            report.warn(
                TransformStep::NullAudit,
                format!(
                    "Column {} has {:.2}% null values (threshold: {:.2}%)",
                    column.name(),
                    fraction * 100.0,
                    threshold * 100.0
                ),
            );
        }
    }
}

pub(super) fn validate_final(records: &RecordSet, required: &[String]) -> Result<()> {
    if records.is_empty() {
        return Err(Error::EmptyResult);
    }
    require_columns(records, required)
}
