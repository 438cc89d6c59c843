use async_trait::async_trait;
use etl_core::retry::{retry_with_backoff, AttemptError, RetryPolicy};
use etl_core::{Error, RecordSet, Result, Source, SourceStatus};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::payload::normalize_payload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API
    pub base_url: String,

    /// Endpoint appended to the base URL
    #[serde(default)]
    pub endpoint: String,

    /// Query parameters; non-string values are sent as their JSON text
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: u64,

    /// Total attempts, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff time unit in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }

    /// `base_url` and `endpoint` joined by exactly one slash.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.backoff_base_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("API base_url not configured".to_string()));
        }
        reqwest::Url::parse(&self.url())
            .map_err(|e| Error::Config(format!("Invalid API url '{}': {}", self.url(), e)))?;
        if self.retry_attempts == 0 {
            return Err(Error::Config("retry_attempts must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    fn query(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Fetches records from a REST endpoint, retrying transient failures.
pub struct ApiSource {
    name: String,
    config: ApiConfig,
    client: Client,
    status: SourceStatus,
}

impl ApiSource {
    /// Builds the HTTP client; no request is sent.
    pub fn new(name: impl Into<String>, config: ApiConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(config.header_map()?)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
            status: SourceStatus::default(),
        })
    }
}

#[async_trait]
impl Source for ApiSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self, cancel: &CancellationToken) -> Result<RecordSet> {
        let url = self.config.url();
        let query = self.config.query();
        let policy = self.config.retry_policy();
        info!("Extracting data from API: {}", url);

        let client = &self.client;
        let name = self.name.as_str();
        let mut attempts = 0u64;

        let result = retry_with_backoff(&policy, name, cancel, |attempt| {
            attempts += 1;
            debug!(attempt = attempt + 1, "GET {}", url);
            let request = client.get(&url).query(&query);
            let name = name.to_string();

            async move {
                let response = request.send().await.map_err(|e| {
                    if e.is_builder() {
                        AttemptError::Permanent(Error::Config(format!("Invalid request: {}", e)))
                    } else {
                        AttemptError::Transient(e.into())
                    }
                })?;

                let status = response.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(AttemptError::Transient(anyhow::anyhow!("HTTP status {}", status)));
                }
                if !status.is_success() {
                    return Err(AttemptError::Permanent(Error::SourceUnavailable {
                        source_name: name,
                        attempts: attempt + 1,
                        cause: anyhow::anyhow!("HTTP status {}", status),
                    }));
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| AttemptError::Transient(e.into()))?;
                normalize_payload(&body).map_err(AttemptError::Permanent)
            }
        })
        .await;

        self.status.attempts += attempts;
        match result {
            Ok(records) => {
                info!("Successfully extracted {} records from API", records.row_count());
                self.status.records_fetched += records.row_count() as u64;
                Ok(records)
            }
            Err(e) => {
                self.status.errors += 1;
                self.status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn status(&self) -> SourceStatus {
        self.status.clone()
    }
}
