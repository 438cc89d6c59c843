use crate::{PostgresConfig, SqlSink, SqliteConfig};
use etl_core::{Error, Result, Sink, SinkFactory};
use serde_json::Value;

pub struct SqliteSinkFactory;

impl SinkFactory for SqliteSinkFactory {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn create(&self, config: Value) -> Result<Box<dyn Sink>> {
        let config: SqliteConfig = serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid SQLite sink: {}", e)))?;
        Ok(Box::new(SqlSink::sqlite(config)))
    }
}

pub struct PostgresSinkFactory;

impl SinkFactory for PostgresSinkFactory {
    fn name(&self) -> &str {
        "postgresql"
    }

    fn create(&self, config: Value) -> Result<Box<dyn Sink>> {
        let config: PostgresConfig = serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid PostgreSQL sink: {}", e)))?;
        Ok(Box::new(SqlSink::postgres(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_unconnected_sinks() {
        let sink = SqliteSinkFactory
            .create(json!({"path": "data/etl.db", "create_indexes": false}))
            .unwrap();
        assert!(!sink.is_connected());

        let sink = PostgresSinkFactory
            .create(json!({"host": "localhost", "username": "etl"}))
            .unwrap();
        assert!(!sink.status().connected);
    }

    #[test]
    fn test_invalid_config_is_a_config_error() {
        assert!(matches!(
            PostgresSinkFactory.create(json!({"database": "etl"})),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SqliteSinkFactory.create(json!({"index_columns": "order_id"})),
            Err(Error::Config(_))
        ));
    }
}
