use crate::{RecordSet, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Trait for record set sources
#[async_trait]
pub trait Source: Send + Sync {
    /// Name this source was configured under
    fn name(&self) -> &str;

    /// Fetch the whole record set.
    ///
    /// Fails with `NotFound`, `InvalidSourceFormat` or `SourceUnavailable`.
    async fn fetch(&mut self, cancel: &CancellationToken) -> Result<RecordSet>;

    /// Get source status information
    fn status(&self) -> SourceStatus;
}

#[derive(Debug, Clone, Default)]
pub struct SourceStatus {
    pub records_fetched: u64,
    pub attempts: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}
