//! Runs extract, transform and load across the configured sources.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{ErrorHandling, PipelineConfig};
use crate::metrics::{Metrics, MetricsSummary};
use crate::profile::DataProfile;
use crate::record_set::RecordSet;
use crate::transform::TransformPipeline;
use crate::{Error, Registry, Result, Sink, Source};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::Transforming => "transforming",
            RunState::Loading => "loading",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub summary: MetricsSummary,
    pub error: Option<Error>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

/// Before/after profiles of one source, produced without loading.
#[derive(Debug, Clone, Serialize)]
pub struct SourceProfile {
    pub source: String,
    pub before: DataProfile,
    pub after: Option<DataProfile>,
    pub error: Option<String>,
}

/// Drives one pipeline run end to end.
pub struct Orchestrator {
    config: PipelineConfig,
    sources: Vec<Box<dyn Source>>,
    sink: Box<dyn Sink>,
    transformer: TransformPipeline,
    state: RunState,
    metrics: Metrics,
}

impl Orchestrator {
    /// `sources` are processed in the order given.
    pub fn new(config: PipelineConfig, sources: Vec<Box<dyn Source>>, sink: Box<dyn Sink>) -> Self {
        let transformer = TransformPipeline::from_config(&config);
        Self {
            config,
            sources,
            sink,
            transformer,
            state: RunState::Idle,
            metrics: Metrics::new(),
        }
    }

    /// Build every configured source and the sink through the registry.
    pub fn from_config(config: PipelineConfig, registry: &Registry) -> Result<Self> {
        let mut sources = Vec::with_capacity(config.sources.len());
        for (name, source) in &config.sources {
            let factory = registry.source_factory(&source.source_type)?;
            sources.push(factory.create(name, source.config.clone())?);
        }

        let sink = registry
            .sink_factory(&config.database.sink_type)?
            .create(config.database.config.clone())?;

        Ok(Self::new(config, sources, sink))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Metrics of the most recent run.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run the pipeline for one named source, or for every source.
    ///
    /// Never panics on stage failures: the outcome, the summary and the
    /// failure are all in the returned report. The sink is closed on every
    /// path. A sink that cannot connect fails the run even in skip mode.
    pub async fn run(&mut self, only: Option<&str>, cancel: &CancellationToken) -> RunReport {
        let mut metrics = Metrics::new();
        metrics.start();

        let span = info_span!(
            "pipeline_run",
            run_id = %metrics.run_id(),
            pipeline = %self.config.pipeline.name
        );

        let result = async {
            info!("Starting ETL pipeline");
            let outcome = self.execute(only, cancel, &mut metrics).await;

            if let Err(e) = self.sink.close().await {
                warn!("Failed to close sink: {}", e);
            }

            match &outcome {
                Ok(()) => info!("Pipeline completed successfully"),
                Err(e) => error!("Pipeline failed: {}", e),
            }
            outcome
        }
        .instrument(span.clone())
        .await;

        metrics.end();
        let summary = metrics.summary();
        span.in_scope(|| summary.log());

        self.state = if result.is_ok() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.metrics = metrics;

        RunReport {
            state: self.state,
            summary,
            error: result.err(),
        }
    }

    /// Extract and transform without loading; reports profiles per source.
    pub async fn profile(
        &mut self,
        only: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceProfile>> {
        let mut metrics = Metrics::new();
        let extracted = self.extract(only, cancel, &mut metrics).await?;
        self.state = RunState::Idle;

        Ok(extracted
            .into_iter()
            .map(|(source, records)| {
                let before = DataProfile::of(&records);
                match self.transformer.transform(&records) {
                    Ok(transformed) => SourceProfile {
                        source,
                        before,
                        after: Some(DataProfile::of(&transformed)),
                        error: None,
                    },
                    Err(e) => SourceProfile {
                        source,
                        before,
                        after: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect())
    }

    async fn execute(
        &mut self,
        only: Option<&str>,
        cancel: &CancellationToken,
        metrics: &mut Metrics,
    ) -> Result<()> {
        let extracted = self.extract(only, cancel, metrics).await?;
        let transformed = self.transform(extracted, cancel, metrics)?;
        self.load(transformed, cancel, metrics).await
    }

    async fn extract(
        &mut self,
        only: Option<&str>,
        cancel: &CancellationToken,
        metrics: &mut Metrics,
    ) -> Result<Vec<(String, RecordSet)>> {
        self.state = RunState::Extracting;
        info!("Stage 1: EXTRACT");

        let extracted = match only {
            Some(name) => {
                let Some(source) = self.sources.iter_mut().find(|s| s.name() == name) else {
                    return Err(record(metrics, Error::Config(format!("Unknown source: {}", name))));
                };
                ensure_not_cancelled(cancel, metrics)?;

                info!("Extracting data from {}", name);
                let records = source.fetch(cancel).await.map_err(|e| {
                    error!("Extraction failed for {}: {}", name, e);
                    metrics.record_error(format!("Extract error ({}): {}", name, e));
                    e
                })?;
                vec![(name.to_string(), records)]
            }
            None => {
                let mut extracted = Vec::with_capacity(self.sources.len());
                for source in self.sources.iter_mut() {
                    ensure_not_cancelled(cancel, metrics)?;

                    let name = source.name().to_string();
                    info!("Extracting data from {}", name);
                    match source.fetch(cancel).await {
                        Ok(records) => extracted.push((name, records)),
                        Err(Error::Cancelled) => return Err(record(metrics, Error::Cancelled)),
                        Err(e) => {
                            error!("Failed to extract {}: {}", name, e);
                            metrics.record_error(format!("Extract error ({}): {}", name, e));
                        }
                    }
                }

                let names: Vec<&str> = extracted.iter().map(|(n, _)| n.as_str()).collect();
                info!("Extraction complete. Sources extracted: {:?}", names);
                if extracted.is_empty() {
                    return Err(record(metrics, Error::NoDataExtracted));
                }
                extracted
            }
        };

        let total: usize = extracted.iter().map(|(_, r)| r.row_count()).sum();
        metrics.add_extracted(total as u64);
        info!("Total records extracted: {}", total);
        Ok(extracted)
    }

    fn transform(
        &mut self,
        extracted: Vec<(String, RecordSet)>,
        cancel: &CancellationToken,
        metrics: &mut Metrics,
    ) -> Result<Vec<(String, RecordSet)>> {
        self.state = RunState::Transforming;
        info!("Stage 2: TRANSFORM");

        let mut transformed = Vec::with_capacity(extracted.len());
        for (name, records) in extracted {
            ensure_not_cancelled(cancel, metrics)?;

            info!("Transforming data from {}", name);
            match self.transformer.run(&records) {
                Ok(output) => {
                    DataProfile::of(&output.records).log(&name);
                    if !output.report.is_clean() {
                        info!("{} note(s) raised while transforming {}", output.report.notes.len(), name);
                    }
                    transformed.push((name, output.records));
                }
                Err(e) => {
                    error!("Transformation failed for {}: {}", name, e);
                    metrics.record_error(format!("Transform error ({}): {}", name, e));
                    match self.config.pipeline.error_handling {
                        ErrorHandling::Rollback => return Err(e),
                        ErrorHandling::Skip => warn!("Skipping {} due to error", name),
                    }
                }
            }
        }

        if transformed.is_empty() {
            return Err(record(metrics, Error::NoDataTransformed));
        }

        let total: usize = transformed.iter().map(|(_, r)| r.row_count()).sum();
        metrics.add_transformed(total as u64);
        info!("Total records transformed: {}", total);
        Ok(transformed)
    }

    /// Writes each transformed source to its table.
    ///
    /// Write failures follow the error handling mode, but failing to connect
    /// aborts the run in both modes since nothing could be loaded.
    async fn load(
        &mut self,
        transformed: Vec<(String, RecordSet)>,
        cancel: &CancellationToken,
        metrics: &mut Metrics,
    ) -> Result<()> {
        self.state = RunState::Loading;
        info!("Stage 3: LOAD");

        ensure_not_cancelled(cancel, metrics)?;
        if !self.sink.is_connected() {
            self.sink.connect().await.map_err(|e| {
                metrics.record_error(format!("Load error: {}", e));
                e
            })?;
        }

        let base = self.config.output.table_name.clone();
        let mode = self.config.output.write_mode;
        let suffixed = transformed.len() > 1;

        for (name, records) in transformed {
            ensure_not_cancelled(cancel, metrics)?;

            let table = table_name(&base, &name, suffixed);
            info!("Loading data from {} into {}", name, table);
            match self.sink.write(&records, &table, mode).await {
                Ok(written) => {
                    metrics.add_loaded(written);
                    info!("Loaded {} records to {}", written, table);
                }
                Err(e) => {
                    error!("Load failed for {}: {}", name, e);
                    metrics.record_error(format!("Load error ({}): {}", name, e));
                    match self.config.pipeline.error_handling {
                        ErrorHandling::Rollback => return Err(e),
                        ErrorHandling::Skip => warn!("Skipping load of {} due to error", name),
                    }
                }
            }
        }

        info!("Total records loaded: {}", metrics.records_loaded());
        Ok(())
    }
}

/// `<base>_<source>` when several sources load, `<base>` otherwise.
pub fn table_name(base: &str, source: &str, suffixed: bool) -> String {
    if suffixed {
        format!("{}_{}", base, source)
    } else {
        base.to_string()
    }
}

fn record(metrics: &mut Metrics, err: Error) -> Error {
    metrics.record_error(err.to_string());
    err
}

fn ensure_not_cancelled(cancel: &CancellationToken, metrics: &mut Metrics) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(record(metrics, Error::Cancelled));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("orders", "csv", false), "orders");
        assert_eq!(table_name("orders", "csv", true), "orders_csv");
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Extracting.to_string(), "extracting");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }
}
