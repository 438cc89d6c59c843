use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Counters, timings and the error log of one run.
///
/// Passed explicitly to every stage; entries are kept in record order.
#[derive(Debug, Clone)]
pub struct Metrics {
    run_id: Uuid,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    records_extracted: u64,
    records_transformed: u64,
    records_loaded: u64,
    errors: Vec<ErrorEntry>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: None,
            ended_at: None,
            records_extracted: 0,
            records_transformed: 0,
            records_loaded: 0,
            errors: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn add_extracted(&mut self, count: u64) {
        self.records_extracted += count;
    }

    pub fn add_transformed(&mut self, count: u64) {
        self.records_transformed += count;
    }

    pub fn add_loaded(&mut self, count: u64) {
        self.records_loaded += count;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(ErrorEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    pub fn records_extracted(&self) -> u64 {
        self.records_extracted
    }

    pub fn records_transformed(&self) -> u64 {
        self.records_transformed
    }

    pub fn records_loaded(&self) -> u64 {
        self.records_loaded
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Seconds between `start()` and `end()`; zero until both happened.
    pub fn duration_seconds(&self) -> f64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => {
                (end - start).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0
            }
            _ => 0.0,
        }
    }

    /// Loaded over extracted, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.records_extracted == 0 {
            return 0.0;
        }
        self.records_loaded as f64 / self.records_extracted as f64 * 100.0
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds: self.duration_seconds(),
            records_extracted: self.records_extracted,
            records_transformed: self.records_transformed,
            records_loaded: self.records_loaded,
            success_rate: self.success_rate(),
            error_count: self.errors.len(),
            errors: self.errors.clone(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub run_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub records_extracted: u64,
    pub records_transformed: u64,
    pub records_loaded: u64,
    /// Percentage of extracted records that were loaded
    pub success_rate: f64,
    pub error_count: usize,
    pub errors: Vec<ErrorEntry>,
}

impl MetricsSummary {
    /// Emit the summary through tracing.
    pub fn log(&self) {
        info!(run_id = %self.run_id, "Pipeline execution summary");
        info!("Duration: {:.2} seconds", self.duration_seconds);
        info!("Records extracted: {}", self.records_extracted);
        info!("Records transformed: {}", self.records_transformed);
        info!("Records loaded: {}", self.records_loaded);
        info!("Success rate: {:.2}%", self.success_rate);
        info!("Errors: {}", self.error_count);
        for entry in &self.errors {
            info!("  [{}] {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S"), entry.message);
        }
    }
}
