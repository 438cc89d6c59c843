use crate::{PostgresConfig, SqliteConfig, TableOptions, TypeMapping};
use async_trait::async_trait;
use etl_core::{
    Column, DataType, Error, RecordSet, Result, Sink, SinkStatus, Value, WriteMode,
    DATETIME_FORMAT,
};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, AnyPool, Column as _, Row};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Bind parameters allowed in one INSERT, kept under SQLite's historical limit of 999.
const MAX_BIND_PARAMS: usize = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", position),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Sqlite => f.write_str("SQLite"),
            Dialect::Postgres => f.write_str("PostgreSQL"),
        }
    }
}

/// Relational sink over the sqlx `Any` driver.
///
/// Every `write` runs in one transaction: the table is created, replaced or
/// widened, then the rows are inserted in multi-row statements.
pub struct SqlSink {
    dialect: Dialect,
    url: String,
    database_path: Option<PathBuf>,
    options: TableOptions,
    type_mapping: TypeMapping,
    pool: Option<AnyPool>,
    status: SinkStatus,
}

impl SqlSink {
    pub fn sqlite(config: SqliteConfig) -> Self {
        Self::new(Dialect::Sqlite, config.url, config.path, config.options)
    }

    pub fn postgres(config: PostgresConfig) -> Self {
        Self::new(Dialect::Postgres, config.url, None, config.options)
    }

    fn new(dialect: Dialect, url: String, database_path: Option<PathBuf>, options: TableOptions) -> Self {
        let type_mapping = TypeMapping::with_custom_mappings(dialect, options.type_mapping.clone());
        Self {
            dialect,
            url,
            database_path,
            options,
            type_mapping,
            pool: None,
            status: SinkStatus::default(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn pool(&self) -> Result<&AnyPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::Write("Not connected".to_string()))
    }

    async fn table_exists(&self, conn: &mut AnyConnection, table: &str) -> Result<bool> {
        let sql = match self.dialect {
            Dialect::Sqlite => "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            Dialect::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name::text = $1"
            }
        };

        let row = sqlx::query(sql)
            .bind(table.to_string())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| database_error("Failed to check table existence", e))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| database_error("Failed to read table existence", e))?;

        Ok(count > 0)
    }

    async fn table_columns(&self, conn: &mut AnyConnection, table: &str) -> Result<HashSet<String>> {
        let sql = match self.dialect {
            Dialect::Sqlite => "SELECT name FROM pragma_table_info(?)",
            Dialect::Postgres => {
                "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name::text = $1"
            }
        };

        let rows = sqlx::query(sql)
            .bind(table.to_string())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| database_error("Failed to read table schema", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| database_error("Failed to read column name", e))
            })
            .collect()
    }

    async fn create_table(&self, conn: &mut AnyConnection, records: &RecordSet, table: &str) -> Result<()> {
        let column_defs = records
            .columns()
            .iter()
            .map(|column| {
                format!(
                    "{} {}",
                    Self::quote_identifier(column.name()),
                    self.type_mapping.map_type(column.dtype())
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!("CREATE TABLE {} ({})", Self::quote_identifier(table), column_defs);
        info!("Creating table: {}", sql);
        sqlx::query(&sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| write_error("Failed to create table", e))?;

        Ok(())
    }

    /// Add columns present in the records but missing from the table
    async fn add_missing_columns(
        &self,
        conn: &mut AnyConnection,
        records: &RecordSet,
        table: &str,
    ) -> Result<()> {
        let existing = self.table_columns(conn, table).await?;
        let missing: Vec<&Column> = records
            .columns()
            .iter()
            .filter(|column| !existing.contains(column.name()))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        info!("Detected {} missing column(s) in table {}", missing.len(), table);
        for column in missing {
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                Self::quote_identifier(table),
                Self::quote_identifier(column.name()),
                self.type_mapping.map_type(column.dtype())
            );
            info!("Adding column: {}", sql);
            sqlx::query(&sql).execute(&mut *conn).await.map_err(|e| {
                write_error(&format!("Failed to add column {}", column.name()), e)
            })?;
        }

        Ok(())
    }

    async fn insert_rows(&self, conn: &mut AnyConnection, records: &RecordSet, table: &str) -> Result<u64> {
        let columns = records.columns();
        let column_list = columns
            .iter()
            .map(|column| Self::quote_identifier(column.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);

        let mut written = 0u64;
        let mut start = 0;
        while start < records.row_count() {
            let end = (start + rows_per_statement).min(records.row_count());
            let sql = self.insert_sql(table, &column_list, columns.len(), end - start);
            debug!("Inserting rows {}..{} into {}", start, end, table);

            let mut query = sqlx::query(&sql);
            for row in start..end {
                for column in columns {
                    query = bind_value(query, &column.values()[row], column.dtype());
                }
            }

            query
                .execute(&mut *conn)
                .await
                .map_err(|e| write_error("Failed to insert rows", e))?;

            written += (end - start) as u64;
            start = end;
        }

        Ok(written)
    }

    fn insert_sql(&self, table: &str, column_list: &str, width: usize, rows: usize) -> String {
        let tuples = (0..rows)
            .map(|row| {
                let placeholders = (1..=width)
                    .map(|col| self.dialect.placeholder(row * width + col))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", placeholders)
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            Self::quote_identifier(table),
            column_list,
            tuples
        )
    }

    async fn write_records(&self, records: &RecordSet, table: &str, mode: WriteMode) -> Result<u64> {
        if records.column_count() == 0 {
            return Err(Error::Write(format!(
                "Cannot write a record set without columns to {}",
                table
            )));
        }

        let pool = self.pool()?;
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| write_error("Failed to begin transaction", e))?;

        let exists = self.table_exists(&mut tx, table).await?;
        match (exists, mode) {
            (true, WriteMode::Fail) => {
                return Err(Error::Write(format!("Table '{}' already exists", table)));
            }
            (true, WriteMode::Replace) => {
                info!("Replacing table {}", table);
                let sql = format!("DROP TABLE {}", Self::quote_identifier(table));
                sqlx::query(&sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| write_error("Failed to drop table", e))?;
                self.create_table(&mut tx, records, table).await?;
            }
            (true, WriteMode::Append) => {
                self.add_missing_columns(&mut tx, records, table).await?;
            }
            (false, _) => {
                self.create_table(&mut tx, records, table).await?;
            }
        }

        let written = self.insert_rows(&mut tx, records, table).await?;

        tx.commit()
            .await
            .map_err(|e| write_error("Failed to commit transaction", e))?;

        if self.options.create_indexes {
            self.create_indexes(records, table).await;
        }

        Ok(written)
    }

    /// Index the configured columns present in `records`; failures only warn
    async fn create_indexes(&self, records: &RecordSet, table: &str) {
        let Ok(pool) = self.pool() else {
            return;
        };

        for column in &self.options.index_columns {
            if !records.has_column(column) {
                continue;
            }

            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                Self::quote_identifier(&format!("idx_{}_{}", table, column)),
                Self::quote_identifier(table),
                Self::quote_identifier(column)
            );
            debug!("Creating index: {}", sql);
            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                warn!("Failed to create index on {}.{}: {}", table, column, e);
            }
        }
    }
}

fn write_error(context: &str, e: sqlx::Error) -> Error {
    Error::Write(format!("{}: {}", context, e))
}

fn database_error(context: &str, e: sqlx::Error) -> Error {
    Error::Generic(anyhow::anyhow!("{}: {}", context, e))
}

/// Bind a cell; nulls carry the column's type so PostgreSQL accepts them.
fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
    dtype: DataType,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Boolean(b) => query.bind(*b),
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::DateTime(dt) => query.bind(dt.format(DATETIME_FORMAT).to_string()),
        Value::Null => match dtype {
            DataType::Boolean => query.bind(None::<bool>),
            DataType::Integer => query.bind(None::<i64>),
            DataType::Float => query.bind(None::<f64>),
            DataType::Text | DataType::DateTime | DataType::Null => query.bind(None::<String>),
        },
    }
}

fn decode_cell(row: &AnyRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.into();
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.into();
    }
    row.try_get::<Option<String>, _>(index)
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn rows_to_record_set(rows: &[AnyRow]) -> Result<RecordSet> {
    let Some(first) = rows.first() else {
        return Ok(RecordSet::empty());
    };

    let columns = first
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let values = rows.iter().map(|row| decode_cell(row, index)).collect();
            Column::new(column.name(), values)
        })
        .collect();

    RecordSet::new(columns)
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &url[..scheme], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl Sink for SqlSink {
    async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        info!("Connecting to {}: {}", self.dialect, redact(&self.url));

        if let Some(parent) = self
            .database_path
            .as_deref()
            .and_then(|path| path.parent())
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(self.options.max_connections)
            .connect(&self.url)
            .await
            .map_err(|e| Error::Write(format!("Failed to connect to {}: {}", self.dialect, e)))?;

        info!("Connected to {} successfully", self.dialect);
        self.pool = Some(pool);
        self.status.connected = true;

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            info!("Disconnecting from {}", self.dialect);
            pool.close().await;
        }

        self.status.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn write(&mut self, records: &RecordSet, table: &str, mode: WriteMode) -> Result<u64> {
        match self.write_records(records, table, mode).await {
            Ok(written) => {
                self.status.records_written += written;
                info!("Loaded {} rows into {} ({})", written, table, mode);
                Ok(written)
            }
            Err(e) => {
                self.status.errors += 1;
                self.status.last_error = Some(e.to_string());
                error!("Failed to write to {}: {}", table, e);
                Err(e)
            }
        }
    }

    async fn exists(&mut self, table: &str) -> Result<bool> {
        let mut conn = self
            .pool()?
            .acquire()
            .await
            .map_err(|e| database_error("Failed to acquire connection", e))?;
        self.table_exists(&mut conn, table).await
    }

    async fn count(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Self::quote_identifier(table));
        let row = sqlx::query(&sql)
            .fetch_one(self.pool()?)
            .await
            .map_err(|e| database_error("Failed to count rows", e))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| database_error("Failed to read row count", e))?;

        Ok(count.max(0) as u64)
    }

    async fn query(&mut self, statement: &str) -> Result<RecordSet> {
        debug!("Executing query: {}", statement);
        let rows = sqlx::query(statement)
            .fetch_all(self.pool()?)
            .await
            .map_err(|e| database_error("Query failed", e))?;

        rows_to_record_set(&rows)
    }

    async fn truncate(&mut self, table: &str) -> Result<()> {
        let sql = match self.dialect {
            Dialect::Sqlite => format!("DELETE FROM {}", Self::quote_identifier(table)),
            Dialect::Postgres => format!("TRUNCATE TABLE {}", Self::quote_identifier(table)),
        };
        info!("Truncating table {}", table);
        sqlx::query(&sql)
            .execute(self.pool()?)
            .await
            .map_err(|e| database_error("Failed to truncate table", e))?;

        Ok(())
    }

    async fn drop_table(&mut self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", Self::quote_identifier(table));
        info!("Dropping table {}", table);
        sqlx::query(&sql)
            .execute(self.pool()?)
            .await
            .map_err(|e| database_error("Failed to drop table", e))?;

        Ok(())
    }

    fn status(&self) -> SinkStatus {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn orders(n: i64) -> RecordSet {
        let processed_at = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();

        RecordSet::new(vec![
            Column::new("order_id", (0..n).map(|i| Value::from(format!("A{}", i))).collect()),
            Column::new("quantity", (0..n).map(Value::from).collect()),
            Column::new("price", (0..n).map(|i| Value::from(i as f64 + 0.5)).collect()),
            Column::new("processed_at", (0..n).map(|_| Value::from(processed_at)).collect()),
        ])
        .unwrap()
    }

    async fn connected(dir: &tempfile::TempDir) -> SqlSink {
        let mut sink = SqlSink::sqlite(SqliteConfig::from_path(dir.path().join("nested/etl.db")));
        sink.connect().await.unwrap();
        sink
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqlSink::quote_identifier("orders"), "\"orders\"");
        assert_eq!(SqlSink::quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_insert_sql_placeholders() {
        let sink = SqlSink::postgres(PostgresConfig {
            url: "postgresql://localhost/etl".to_string(),
            options: TableOptions::default(),
        });
        assert_eq!(
            sink.insert_sql("t", "\"a\", \"b\"", 2, 2),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );

        let sink = SqlSink::sqlite(SqliteConfig::from_path("etl.db"));
        assert_eq!(
            sink.insert_sql("t", "\"a\"", 1, 2),
            "INSERT INTO \"t\" (\"a\") VALUES (?), (?)"
        );
    }

    #[test]
    fn test_redact_hides_credentials() {
        assert_eq!(
            redact("postgresql://etl:secret@db:5432/warehouse"),
            "postgresql://***@db:5432/warehouse"
        );
        assert_eq!(redact("sqlite://data/etl.db"), "sqlite://data/etl.db");
    }

    #[tokio::test]
    async fn test_append_twice_doubles_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;

        assert!(!sink.exists("orders").await.unwrap());
        assert_eq!(sink.write(&orders(5), "orders", WriteMode::Append).await.unwrap(), 5);
        assert_eq!(sink.write(&orders(5), "orders", WriteMode::Append).await.unwrap(), 5);

        assert!(sink.exists("orders").await.unwrap());
        assert_eq!(sink.count("orders").await.unwrap(), 10);
        assert_eq!(sink.status().records_written, 10);
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_keeps_only_latest_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;

        sink.write(&orders(5), "orders", WriteMode::Append).await.unwrap();
        sink.write(&orders(3), "orders", WriteMode::Replace).await.unwrap();

        assert_eq!(sink.count("orders").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fail_mode_rejects_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;

        sink.write(&orders(2), "orders", WriteMode::Fail).await.unwrap();
        let err = sink
            .write(&orders(2), "orders", WriteMode::Fail)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Write(_)));
        assert_eq!(sink.count("orders").await.unwrap(), 2);
        assert_eq!(sink.status().errors, 1);
        assert!(sink.status().last_error.is_some());
    }

    #[tokio::test]
    async fn test_append_adds_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;
        sink.write(&orders(2), "orders", WriteMode::Append).await.unwrap();

        let mut wider = orders(1);
        wider
            .set_column(Column::new("status", vec![Value::from("shipped")]))
            .unwrap();
        sink.write(&wider, "orders", WriteMode::Append).await.unwrap();

        let result = sink
            .query("SELECT status FROM orders ORDER BY status")
            .await
            .unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(
            result.column("status").unwrap().values().iter().filter(|v| v.is_null()).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_query_reads_back_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;
        sink.write(&orders(3), "orders", WriteMode::Append).await.unwrap();

        let result = sink
            .query("SELECT order_id, quantity, price, processed_at FROM orders ORDER BY quantity")
            .await
            .unwrap();

        assert_eq!(result.column_names(), vec!["order_id", "quantity", "price", "processed_at"]);
        assert_eq!(result.column("order_id").unwrap().values()[2], Value::from("A2"));
        assert_eq!(result.column("quantity").unwrap().values()[1], Value::Integer(1));
        assert_eq!(result.column("price").unwrap().values()[0], Value::Float(0.5));
        assert_eq!(
            result.column("processed_at").unwrap().values()[0].as_str(),
            Some("2024-01-15 09:30:00")
        );
    }

    #[tokio::test]
    async fn test_nulls_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;
        let records = RecordSet::new(vec![Column::new(
            "quantity",
            vec![Value::Integer(1), Value::Null],
        )])
        .unwrap();

        sink.write(&records, "orders", WriteMode::Append).await.unwrap();
        let result = sink
            .query("SELECT quantity FROM orders WHERE quantity IS NULL")
            .await
            .unwrap();
        assert_eq!(result.row_count(), 1);
    }

    #[tokio::test]
    async fn test_large_loads_are_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;

        let written = sink.write(&orders(1000), "orders", WriteMode::Append).await.unwrap();
        assert_eq!(written, 1000);
        assert_eq!(sink.count("orders").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_indexes_created_for_present_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;
        sink.write(&orders(2), "orders", WriteMode::Append).await.unwrap();

        let indexes = sink
            .query("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'orders' ORDER BY name")
            .await
            .unwrap();
        assert_eq!(
            indexes.column("name").unwrap().values(),
            &[
                Value::from("idx_orders_order_id"),
                Value::from("idx_orders_processed_at")
            ]
        );
    }

    #[tokio::test]
    async fn test_truncate_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = connected(&dir).await;
        sink.write(&orders(4), "orders", WriteMode::Append).await.unwrap();

        sink.truncate("orders").await.unwrap();
        assert!(sink.exists("orders").await.unwrap());
        assert_eq!(sink.count("orders").await.unwrap(), 0);

        sink.drop_table("orders").await.unwrap();
        assert!(!sink.exists("orders").await.unwrap());
        sink.drop_table("orders").await.unwrap();
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut sink = SqlSink::sqlite(SqliteConfig::from_path("unused.db"));
        assert!(!sink.is_connected());

        let err = sink
            .write(&orders(1), "orders", WriteMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Write(_)));

        sink.close().await.unwrap();
        sink.close().await.unwrap();
    }
}
