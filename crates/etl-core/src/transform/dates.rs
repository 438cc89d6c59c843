use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use super::{replace_column, TransformReport, TransformStep};
use crate::record_set::{Column, RecordSet, Value};

/// Date-time layouts without an offset, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Date-only layouts, tried in order; midnight is assumed.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a cell into a canonical date-time.
///
/// Offsets are normalized to UTC and integers are read as Unix epoch
/// seconds. Returns `None` for nulls and anything unparseable.
pub fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
        Value::Text(text) => parse_text(text.trim()),
        _ => None,
    }
}

fn parse_text(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Rebuild a column as date-times; returns the column and how many
/// non-null cells could not be parsed.
pub(super) fn to_datetime_column(column: &Column) -> (Column, usize) {
    let mut failed = 0;
    let values = column
        .values()
        .iter()
        .map(|value| {
            if value.is_null() {
                return Value::Null;
            }
            match parse_datetime(value) {
                Some(dt) => Value::DateTime(dt),
                None => {
                    failed += 1;
                    Value::Null
                }
            }
        })
        .collect();
    (Column::new(column.name(), values), failed)
}

pub(super) fn standardize(
    records: &mut RecordSet,
    date_columns: &[String],
    report: &mut TransformReport,
) {
    for name in date_columns {
        let Some(column) = records.column(name) else {
            continue;
        };

        debug!("Converting {} to datetime", name);
        let (converted, failed) = to_datetime_column(column);
        if failed > 0 {
            report.warn(
                TransformStep::StandardizeDates,
                format!(
                    "{} value(s) in '{}' could not be parsed as dates and were set to null",
                    failed, name
                ),
            );
        }
        replace_column(records, converted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_set::DataType;

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_accepted_layouts() {
        let cases = [
            ("2024-01-15", "2024-01-15 00:00:00"),
            ("2024/01/15", "2024-01-15 00:00:00"),
            ("01/15/2024", "2024-01-15 00:00:00"),
            ("15.01.2024", "2024-01-15 00:00:00"),
            ("2024-01-15 10:30:00", "2024-01-15 10:30:00"),
            ("2024-01-15T10:30:00", "2024-01-15 10:30:00"),
            ("2024-01-15T10:30:00Z", "2024-01-15 10:30:00"),
            ("2024-01-15T12:30:00+02:00", "2024-01-15 10:30:00"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                parse_datetime(&Value::from(input)),
                Some(at(expected)),
                "input {}",
                input
            );
        }
    }

    #[test]
    fn test_parse_keeps_fractional_seconds() {
        let parsed = parse_datetime(&Value::from("2024-01-15 10:30:00.250")).unwrap();
        assert_eq!(parsed.and_utc().timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_integers_are_epoch_seconds() {
        assert_eq!(
            parse_datetime(&Value::Integer(1_705_314_600)),
            Some(at("2024-01-15 10:30:00"))
        );
    }

    #[test]
    fn test_unparseable_values() {
        assert_eq!(parse_datetime(&Value::from("yesterday")), None);
        assert_eq!(parse_datetime(&Value::from("")), None);
        assert_eq!(parse_datetime(&Value::Boolean(true)), None);
        assert_eq!(parse_datetime(&Value::Null), None);
    }

    #[test]
    fn test_standardize_nulls_failures_and_skips_absent_columns() {
        let mut records = RecordSet::new(vec![Column::new(
            "order_date",
            vec!["2024-01-15".into(), "garbage".into(), Value::Null],
        )])
        .unwrap();
        let mut report = TransformReport::default();
        standardize(
            &mut records,
            &["order_date".to_string(), "ship_date".to_string()],
            &mut report,
        );

        let column = records.column("order_date").unwrap();
        assert_eq!(column.dtype(), DataType::DateTime);
        assert_eq!(column.null_count(), 2);
        assert_eq!(report.notes.len(), 1);
        assert!(report.notes[0].message.starts_with("1 value(s)"));
    }
}
