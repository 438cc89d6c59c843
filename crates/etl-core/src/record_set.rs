use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::{Error, Result};

/// Text form used whenever a date-time leaves the record set.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Every value in the column is null.
    Null,
    Boolean,
    Integer,
    Float,
    Text,
    DateTime,
}

impl DataType {
    pub fn label(&self) -> &'static str {
        match self {
            DataType::Null => "null",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Text => "text",
            DataType::DateTime => "datetime",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single cell.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Text(_) => DataType::Text,
            Value::DateTime(_) => DataType::DateTime,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of integer and float cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Stringified form; `None` for nulls.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
        }
    }

    /// Bytes held by this cell, including heap data.
    fn footprint(&self) -> usize {
        let heap = match self {
            Value::Text(s) => s.capacity(),
            _ => 0,
        };
        std::mem::size_of::<Value>() + heap
    }
}

// Floats compare by bit pattern so rows can be hashed; NaN == NaN and -0.0 == 0.0.
fn float_key(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_key(*a) == float_key(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => float_key(*f).hash(state),
            Value::Text(s) => s.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            JsonValue::String(s) => Value::Text(s.clone()),
            // Nested structures are kept as their JSON text
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A named, typed column. All non-null values agree with `dtype`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    dtype: DataType,
    values: Vec<Value>,
}

impl Column {
    /// Build a column, inferring its declared type from the values.
    ///
    /// Integers mixed with floats widen to float; any other mix of types
    /// falls back to text.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = infer_type(&values);
        let values = match dtype {
            DataType::Float => values
                .into_iter()
                .map(|v| match v {
                    Value::Integer(i) => Value::Float(i as f64),
                    other => other,
                })
                .collect(),
            DataType::Text => values
                .into_iter()
                .map(|v| match v {
                    Value::Null | Value::Text(_) => v,
                    other => Value::Text(other.to_text().unwrap_or_default()),
                })
                .collect(),
            _ => values,
        };

        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    fn footprint(&self) -> usize {
        self.name.capacity() + self.values.iter().map(Value::footprint).sum::<usize>()
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}

fn infer_type(values: &[Value]) -> DataType {
    let mut dtype = DataType::Null;
    for value in values {
        let current = value.data_type();
        if current == DataType::Null {
            continue;
        }
        dtype = match (dtype, current) {
            (DataType::Null, t) => t,
            (a, b) if a == b => a,
            (DataType::Integer, DataType::Float) | (DataType::Float, DataType::Integer) => {
                DataType::Float
            }
            _ => DataType::Text,
        };
    }
    dtype
}

/// In-memory table flowing between stages.
///
/// Invariants: every column has the same length and column names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    columns: Vec<Column>,
}

impl RecordSet {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidSourceFormat(format!(
                    "Duplicate column name '{}'",
                    column.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.len() != first.len()) {
                return Err(Error::InvalidSourceFormat(format!(
                    "Column '{}' has {} values, expected {}",
                    bad.name,
                    bad.len(),
                    first.len()
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Row-oriented JSON: one row per object, columns in first-seen key order.
    pub fn from_json_records(records: &[JsonValue]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut cells: Vec<Vec<Value>> = Vec::new();

        for (row, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or_else(|| {
                Error::InvalidSourceFormat(format!("Record {} is not a JSON object", row))
            })?;

            for (key, value) in object {
                let col = match index.get(key) {
                    Some(&col) => col,
                    None => {
                        index.insert(key.clone(), names.len());
                        names.push(key.clone());
                        cells.push(vec![Value::Null; row]);
                        names.len() - 1
                    }
                };
                cells[col].push(Value::from(value));
            }

            // Keys missing from this record are null
            for column in cells.iter_mut() {
                if column.len() < row + 1 {
                    column.push(Value::Null);
                }
            }
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Self::new(columns)
    }

    /// Column-oriented JSON: a mapping of column name to equal-length lists.
    pub fn from_json_columns(map: &serde_json::Map<String, JsonValue>) -> Result<Self> {
        let mut columns = Vec::with_capacity(map.len());
        for (name, list) in map {
            let items = list.as_array().ok_or_else(|| {
                Error::InvalidSourceFormat(format!("Column '{}' is not a list", name))
            })?;
            columns.push(Column::new(name.clone(), items.iter().map(Value::from).collect()));
        }
        Self::new(columns)
    }

    /// Any JSON document: a list is rows, a mapping of lists is columns,
    /// any other mapping is a single row. Scalars are rejected.
    pub fn from_json_value(json: &JsonValue) -> Result<Self> {
        match json {
            JsonValue::Array(records) => Self::from_json_records(records),
            JsonValue::Object(map) if map.values().all(JsonValue::is_array) => {
                Self::from_json_columns(map)
            }
            JsonValue::Object(_) => Self::from_json_records(std::slice::from_ref(json)),
            other => Err(Error::InvalidSourceFormat(format!(
                "Unsupported JSON structure: expected a list or an object, found {}",
                json_kind(other)
            ))),
        }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Name and declared type of every column, in order.
    pub fn schema(&self) -> Vec<(String, DataType)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.dtype))
            .collect()
    }

    /// Add a column, or replace the column with the same name in place.
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(Error::InvalidSourceFormat(format!(
                "Column '{}' has {} values, expected {}",
                column.name,
                column.len(),
                self.row_count()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let position = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(position))
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<Column> {
        &mut self.columns
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.row_count()).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn filter_rows(&self, keep: &[bool]) -> RecordSet {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype,
                values: c
                    .values
                    .iter()
                    .zip(keep)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect(),
            })
            .collect();
        RecordSet { columns }
    }

    /// Mask marking every row that repeats an earlier row.
    pub fn duplicate_mask(&self) -> Vec<bool> {
        let mut seen = HashSet::with_capacity(self.row_count());
        self.rows().map(|row| !seen.insert(row)).collect()
    }

    /// Approximate memory footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        self.columns.iter().map(Column::footprint).sum()
    }
}
