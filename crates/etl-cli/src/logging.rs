use anyhow::Context;
use etl_core::config::RunSettings;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to the configured level.
fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level)),
    }
}

/// Initializes console logging, plus a JSON log file when one is configured.
///
/// The returned guard flushes the file writer on drop and must outlive the run.
pub fn init_logging(settings: &RunSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = env_filter(&settings.log_level)?;

    let (file_layer, guard) = match &settings.log_file {
        Some(log_file) => {
            let path = Path::new(log_file);
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", log_file))?;

            fs::create_dir_all(directory)
                .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let json_console = settings.log_json.then(|| fmt::layer().json());
    let plain_console = (!settings.log_json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(json_console)
        .with(plain_console)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
