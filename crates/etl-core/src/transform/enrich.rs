use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::EnrichmentConfig;
use crate::record_set::{Column, RecordSet, Value};
use crate::Result;

pub const PROCESSED_AT_COLUMN: &str = "processed_at";

/// Stamp every row with `processed_at` and derive the order total.
pub(super) fn enrich(
    records: &mut RecordSet,
    config: &EnrichmentConfig,
    processed_at: NaiveDateTime,
) -> Result<()> {
    let rows = records.row_count();
    records.set_column(Column::new(
        PROCESSED_AT_COLUMN,
        vec![Value::DateTime(processed_at); rows],
    ))?;

    let totals = match (
        records.column(&config.quantity_column),
        records.column(&config.price_column),
    ) {
        (Some(quantity), Some(price)) => Some(multiply(quantity, price)),
        _ => None,
    };

    if let Some(totals) = totals {
        records.set_column(Column::new(config.total_column.as_str(), totals))?;
        debug!("Added {} column", config.total_column);
    }

    Ok(())
}

fn multiply(left: &Column, right: &Column) -> Vec<Value> {
    left.values()
        .iter()
        .zip(right.values())
        .map(|(l, r)| match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => Value::Float(l * r),
            _ => Value::Null,
        })
        .collect()
}
