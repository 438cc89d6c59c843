use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::record_set::RecordSet;

/// Read-only statistics about a record set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DataProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub data_types: BTreeMap<String, String>,
    pub null_counts: BTreeMap<String, usize>,
    /// Null share per column, in percent
    pub null_percentages: BTreeMap<String, f64>,
    pub duplicate_count: usize,
    pub memory_usage_bytes: usize,
    pub memory_usage_mb: f64,
}

impl DataProfile {
    pub fn of(records: &RecordSet) -> Self {
        let rows = records.row_count();
        let mut data_types = BTreeMap::new();
        let mut null_counts = BTreeMap::new();
        let mut null_percentages = BTreeMap::new();

        for column in records.columns() {
            let nulls = column.null_count();
            let percentage = if rows == 0 {
                0.0
            } else {
                nulls as f64 / rows as f64 * 100.0
            };
            data_types.insert(column.name().to_string(), column.dtype().label().to_string());
            null_counts.insert(column.name().to_string(), nulls);
            null_percentages.insert(column.name().to_string(), percentage);
        }

        let memory_usage_bytes = records.memory_usage();

        Self {
            row_count: rows,
            column_count: records.column_count(),
            columns: records.column_names().into_iter().map(String::from).collect(),
            data_types,
            null_counts,
            null_percentages,
            duplicate_count: records.duplicate_mask().into_iter().filter(|d| *d).count(),
            memory_usage_bytes,
            memory_usage_mb: memory_usage_bytes as f64 / 1024.0 / 1024.0,
        }
    }

    pub fn log(&self, label: &str) {
        info!(
            rows = self.row_count,
            columns = self.column_count,
            duplicates = self.duplicate_count,
            "{} profile: {} rows, {} columns, {:.3} MiB",
            label,
            self.row_count,
            self.column_count,
            self.memory_usage_mb
        );
    }
}
