use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source '{source_name}' unavailable after {attempts} attempt(s): {cause}")]
    SourceUnavailable {
        source_name: String,
        attempts: u32,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Invalid source format: {0}")]
    InvalidSourceFormat(String),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Record set is empty after transformation")]
    EmptyResult,

    #[error("Write error: {0}")]
    Write(String),

    #[error("No data extracted from any source")]
    NoDataExtracted,

    #[error("No data successfully transformed")]
    NoDataTransformed,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Extract,
    Transform,
    Load,
    Run,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
            Stage::Run => "run",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::Config(_) | Error::ConfigNotFound(_) | Error::ConfigParse(_) => Stage::Config,
            Error::NotFound(_) | Error::SourceUnavailable { .. } | Error::InvalidSourceFormat(_) => {
                Stage::Extract
            }
            Error::MissingColumns(_) | Error::EmptyResult => Stage::Transform,
            Error::Write(_) => Stage::Load,
            _ => Stage::Run,
        }
    }
}
