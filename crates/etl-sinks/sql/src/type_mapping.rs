use crate::Dialect;
use etl_core::DataType;
use std::collections::HashMap;

/// Maps record set column types to SQL column types
#[derive(Debug, Clone)]
pub struct TypeMapping {
    dialect: Dialect,
    custom_mappings: HashMap<String, String>,
}

impl TypeMapping {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            custom_mappings: HashMap::new(),
        }
    }

    pub fn with_custom_mappings(dialect: Dialect, custom_mappings: HashMap<String, String>) -> Self {
        Self {
            dialect,
            custom_mappings,
        }
    }

    /// Default mappings for a dialect, keyed by data type label.
    ///
    /// Date-times are kept as ISO-8601 text so both dialects read them back identically.
    pub fn get_default_mappings(dialect: Dialect) -> HashMap<String, String> {
        let mut mappings = HashMap::new();

        let (boolean, integer, float) = match dialect {
            Dialect::Sqlite => ("BOOLEAN", "INTEGER", "REAL"),
            Dialect::Postgres => ("BOOLEAN", "BIGINT", "DOUBLE PRECISION"),
        };

        mappings.insert("boolean".to_string(), boolean.to_string());
        mappings.insert("integer".to_string(), integer.to_string());
        mappings.insert("float".to_string(), float.to_string());
        mappings.insert("text".to_string(), "TEXT".to_string());
        mappings.insert("datetime".to_string(), "TEXT".to_string());
        mappings.insert("null".to_string(), "TEXT".to_string());

        mappings
    }

    pub fn map_type(&self, dtype: DataType) -> String {
        if let Some(custom) = self.custom_mappings.get(dtype.label()) {
            return custom.clone();
        }

        Self::get_default_mappings(self.dialect)
            .remove(dtype.label())
            .unwrap_or_else(|| "TEXT".to_string())
    }

    /// Add a custom type mapping
    pub fn add_custom_mapping(&mut self, label: String, sql_type: String) {
        self.custom_mappings.insert(label, sql_type);
    }

    /// Get all available mappings (default + custom)
    pub fn get_all_mappings(&self) -> HashMap<String, String> {
        let mut all = Self::get_default_mappings(self.dialect);
        all.extend(self.custom_mappings.clone());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mappings() {
        let sqlite = TypeMapping::new(Dialect::Sqlite);
        assert_eq!(sqlite.map_type(DataType::Integer), "INTEGER");
        assert_eq!(sqlite.map_type(DataType::Float), "REAL");
        assert_eq!(sqlite.map_type(DataType::Text), "TEXT");

        let postgres = TypeMapping::new(Dialect::Postgres);
        assert_eq!(postgres.map_type(DataType::Integer), "BIGINT");
        assert_eq!(postgres.map_type(DataType::Float), "DOUBLE PRECISION");
        assert_eq!(postgres.map_type(DataType::Boolean), "BOOLEAN");
    }

    #[test]
    fn test_datetime_and_null_are_text() {
        for dialect in [Dialect::Sqlite, Dialect::Postgres] {
            let mapping = TypeMapping::new(dialect);
            assert_eq!(mapping.map_type(DataType::DateTime), "TEXT");
            assert_eq!(mapping.map_type(DataType::Null), "TEXT");
        }
    }

    #[test]
    fn test_custom_mappings() {
        let mut mapping = TypeMapping::new(Dialect::Postgres);
        mapping.add_custom_mapping("datetime".to_string(), "TIMESTAMP".to_string());

        assert_eq!(mapping.map_type(DataType::DateTime), "TIMESTAMP");
        assert_eq!(mapping.map_type(DataType::Text), "TEXT");
        assert_eq!(mapping.get_all_mappings()["datetime"], "TIMESTAMP");
    }
}
