mod record_set;
mod source;
mod sink;
mod error;
mod factory;
mod registry;
mod metrics;
mod profile;
mod orchestrator;
pub mod config;
pub mod retry;
pub mod transform;

pub use record_set::{Column, DataType, RecordSet, Value, DATETIME_FORMAT};
pub use source::{Source, SourceStatus};
pub use sink::{Sink, SinkStatus};
pub use error::{Error, Result, Stage};
pub use factory::{SinkFactory, SourceFactory};
pub use registry::Registry;
pub use metrics::{ErrorEntry, Metrics, MetricsSummary};
pub use profile::DataProfile;
pub use orchestrator::{table_name, Orchestrator, RunReport, RunState, SourceProfile};
pub use config::{
    ErrorHandling, PipelineConfig, QualityConfig, SinkConfig, SourceConfig, TargetType,
    TransformConfig, WriteMode,
};
pub use retry::{retry_with_backoff, AttemptError, RetryPolicy};
pub use transform::{TransformOutput, TransformPipeline, TransformReport};
