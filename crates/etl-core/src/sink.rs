use crate::{RecordSet, Result, WriteMode};
use async_trait::async_trait;

/// Trait for tabular sinks
#[async_trait]
pub trait Sink: Send + Sync {
    /// Connect to the sink
    async fn connect(&mut self) -> Result<()>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Check if the sink is connected
    fn is_connected(&self) -> bool;

    /// Persist a record set under `table`, returning the rows written.
    ///
    /// The write is all-or-nothing; failures are reported as `Error::Write`.
    async fn write(&mut self, records: &RecordSet, table: &str, mode: WriteMode) -> Result<u64>;

    async fn exists(&mut self, table: &str) -> Result<bool>;

    async fn count(&mut self, table: &str) -> Result<u64>;

    /// Run a read-only statement and return its rows
    async fn query(&mut self, statement: &str) -> Result<RecordSet>;

    /// Delete every row of a table
    async fn truncate(&mut self, table: &str) -> Result<()>;

    async fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Get sink status information
    fn status(&self) -> SinkStatus;
}

#[derive(Debug, Clone, Default)]
pub struct SinkStatus {
    pub connected: bool,
    pub records_written: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}
