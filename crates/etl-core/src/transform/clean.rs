use tracing::debug;

use super::{TransformReport, TransformStep};
use crate::record_set::{Column, DataType, RecordSet, Value};

/// Lowercase a column name and replace spaces with underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Trim text cells and normalize column names.
pub(super) fn clean(records: &mut RecordSet, report: &mut TransformReport) {
    debug!("Cleaning {} column(s)", records.column_count());

    let columns = std::mem::take(records.columns_mut());
    let mut cleaned: Vec<Column> = Vec::with_capacity(columns.len());

    for column in columns {
        let mut column = if column.dtype() == DataType::Text {
            trim_text(column)
        } else {
            column
        };

        let name = normalize_column_name(column.name());
        if cleaned.iter().any(|c| c.name() == name) {
            report.warn(
                TransformStep::Clean,
                format!(
                    "Dropped column '{}': normalized name '{}' is already taken",
                    column.name(),
                    name
                ),
            );
            continue;
        }

        column.rename(name);
        cleaned.push(column);
    }

    *records.columns_mut() = cleaned;
}

fn trim_text(column: Column) -> Column {
    let name = column.name().to_string();
    let values = column
        .into_values()
        .into_iter()
        .map(|value| match value {
            Value::Text(text) => Value::Text(text.trim().to_string()),
            other => other,
        })
        .collect();
    Column::new(name, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("Order Date"), "order_date");
        assert_eq!(normalize_column_name("price"), "price");
    }

    #[test]
    fn test_non_text_columns_pass_through() {
        let mut records = RecordSet::new(vec![
            Column::new("Qty", vec![Value::Integer(1), Value::Null]),
            Column::new("Note", vec![" a ".into(), Value::Null]),
        ])
        .unwrap();
        let mut report = TransformReport::default();
        clean(&mut records, &mut report);

        assert_eq!(records.column("qty").unwrap().values()[0], Value::Integer(1));
        assert_eq!(records.column("note").unwrap().values()[0], Value::from("a"));
        assert!(records.column("note").unwrap().values()[1].is_null());
        assert!(report.is_clean());
    }

    #[test]
    fn test_colliding_names_keep_the_first_column() {
        let mut records = RecordSet::new(vec![
            Column::new("Order ID", vec![Value::Integer(1)]),
            Column::new("order_id", vec![Value::Integer(2)]),
        ])
        .unwrap();
        let mut report = TransformReport::default();
        clean(&mut records, &mut report);

        assert_eq!(records.column_names(), vec!["order_id"]);
        assert_eq!(records.column("order_id").unwrap().values()[0], Value::Integer(1));
        assert_eq!(report.notes.len(), 1);
        assert_eq!(report.notes[0].step, TransformStep::Clean);
    }
}
