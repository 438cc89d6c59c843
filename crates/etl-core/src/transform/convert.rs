use std::collections::BTreeMap;

use tracing::debug;

use super::dates::to_datetime_column;
use super::{replace_column, TransformReport, TransformStep};
use crate::config::TargetType;
use crate::record_set::{Column, RecordSet, Value};

/// A rebuilt column plus the number of non-null cells coerced to null.
struct Converted {
    column: Column,
    coerced: usize,
}

pub(super) fn convert_types(
    records: &mut RecordSet,
    data_types: &BTreeMap<String, TargetType>,
    report: &mut TransformReport,
) {
    for (name, target) in data_types {
        let Some(column) = records.column(name) else {
            debug!("Skipping conversion of absent column {}", name);
            continue;
        };

        debug!("Converting {} to {}", name, target);
        match convert_column(column, *target) {
            Ok(converted) => {
                if converted.coerced > 0 {
                    report.warn(
                        TransformStep::ConvertTypes,
                        format!(
                            "{} value(s) in '{}' could not be converted to {} and were set to null",
                            converted.coerced, name, target
                        ),
                    );
                }
                replace_column(records, converted.column);
            }
            Err(reason) => report.warn(
                TransformStep::ConvertTypes,
                format!("Failed to convert '{}' to {}: {}", name, target, reason),
            ),
        }
    }
}

fn convert_column(column: &Column, target: TargetType) -> Result<Converted, String> {
    let convert_one: fn(&Value) -> Result<Option<Value>, String> = match target {
        TargetType::Datetime => {
            let (column, coerced) = to_datetime_column(column);
            return Ok(Converted { column, coerced });
        }
        TargetType::Integer => to_integer,
        TargetType::Float => |value: &Value| Ok(to_float(value)),
        TargetType::String => |value: &Value| Ok(value.to_text().map(Value::Text)),
    };

    let mut coerced = 0;
    let mut values = Vec::with_capacity(column.len());
    for value in column.values() {
        let converted = convert_one(value)?;
        match converted {
            Some(v) => values.push(v),
            None => {
                if !value.is_null() {
                    coerced += 1;
                }
                values.push(Value::Null);
            }
        }
    }

    Ok(Converted {
        column: Column::new(column.name(), values),
        coerced,
    })
}

// i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
const I64_LOWER: f64 = i64::MIN as f64;
const I64_UPPER: f64 = i64::MAX as f64;

/// `Ok(None)` means null; a float with a fractional part fails the column.
/// Whole numbers outside the i64 range are nulled rather than saturated.
fn to_integer(value: &Value) -> Result<Option<Value>, String> {
    let float = match value {
        Value::Integer(i) => return Ok(Some(Value::Integer(*i))),
        Value::Boolean(b) => return Ok(Some(Value::Integer(i64::from(*b)))),
        Value::DateTime(dt) => return Ok(Some(Value::Integer(dt.and_utc().timestamp()))),
        Value::Float(f) => *f,
        Value::Text(text) => {
            let text = text.trim();
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Some(Value::Integer(i)));
            }
            match text.parse::<f64>() {
                Ok(f) => f,
                Err(_) => return Ok(None),
            }
        }
        Value::Null => return Ok(None),
    };

    if float.is_nan() {
        return Ok(None);
    }
    if !float.is_finite() || float.fract() != 0.0 {
        return Err(format!("{} cannot be represented as an integer", float));
    }
    if !(I64_LOWER..I64_UPPER).contains(&float) {
        return Ok(None);
    }
    Ok(Some(Value::Integer(float as i64)))
}

fn to_float(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(i) => Some(Value::Float(*i as f64)),
        Value::Float(f) => Some(Value::Float(*f)),
        Value::Boolean(b) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Text(text) => text.trim().parse::<f64>().ok().map(Value::Float),
        Value::DateTime(_) | Value::Null => None,
    }
}
