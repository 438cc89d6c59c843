use async_trait::async_trait;
use etl_core::{Column, Error, RecordSet, Result, Source, SourceStatus, Value};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvConfig {
    /// Path to the CSV file
    pub path: PathBuf,

    /// Field delimiter; must be a single ASCII character
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Only UTF-8 is supported
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Whether the first row holds the column names
    #[serde(default = "default_has_headers")]
    pub has_headers: bool,
}

fn default_delimiter() -> char {
    ','
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_has_headers() -> bool {
    true
}

impl CsvConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(Error::Config(format!(
                "CSV delimiter must be an ASCII character, got '{}'",
                self.delimiter
            )));
        }
        let encoding = self.encoding.to_ascii_lowercase();
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(Error::Config(format!(
                "Unsupported CSV encoding '{}': only utf-8 is supported",
                self.encoding
            )));
        }
        Ok(())
    }
}

pub struct CsvSource {
    name: String,
    config: CsvConfig,
    status: SourceStatus,
}

impl CsvSource {
    pub fn new(name: impl Into<String>, config: CsvConfig) -> Self {
        Self {
            name: name.into(),
            config,
            status: SourceStatus::default(),
        }
    }

    async fn read(&self) -> Result<RecordSet> {
        let bytes = tokio::fs::read(&self.config.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("CSV file not found: {}", self.config.path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        parse_csv(&bytes, self.config.delimiter as u8, self.config.has_headers)
    }
}

#[async_trait]
impl Source for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self, cancel: &CancellationToken) -> Result<RecordSet> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        info!("Extracting data from CSV: {}", self.config.path.display());
        self.status.attempts += 1;

        match self.read().await {
            Ok(records) => {
                info!("Successfully extracted {} records from CSV", records.row_count());
                self.status.records_fetched += records.row_count() as u64;
                Ok(records)
            }
            Err(e) => {
                error!("Error extracting CSV: {}", e);
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

/// Parse CSV bytes into a record set, inferring one type per column.
pub fn parse_csv(bytes: &[u8], delimiter: u8, has_headers: bool) -> Result<RecordSet> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .from_reader(bytes);

    let mut names: Vec<String> = if has_headers {
        reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for result in reader.records() {
        let record = result.map_err(malformed)?;
        if cells.is_empty() {
            // Headerless input: the first record fixes the width
            names = (1..=record.len()).map(|i| format!("column_{}", i)).collect();
            cells = vec![Vec::new(); record.len()];
        }
        for (column, field) in cells.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| infer_column(name, raw))
        .collect();
    RecordSet::new(columns)
}

fn malformed(err: csv::Error) -> Error {
    Error::InvalidSourceFormat(format!("Malformed CSV: {}", err))
}

/// Integer if every non-empty cell is one, then float, then boolean, else text.
fn infer_column(name: String, raw: Vec<String>) -> Column {
    let filled = || raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty());

    let parse: fn(&str) -> Value = if filled().all(|s| s.parse::<i64>().is_ok()) {
        |s: &str| s.trim().parse::<i64>().map(Value::Integer).unwrap_or(Value::Null)
    } else if filled().all(|s| s.parse::<f64>().is_ok()) {
        |s: &str| s.trim().parse::<f64>().map(Value::Float).unwrap_or(Value::Null)
    } else if filled().all(|s| parse_bool(s).is_some()) {
        |s: &str| parse_bool(s.trim()).map(Value::Boolean).unwrap_or(Value::Null)
    } else {
        |s: &str| Value::Text(s.to_string())
    };

    let values = raw
        .iter()
        .map(|s| if s.is_empty() { Value::Null } else { parse(s) })
        .collect();
    Column::new(name, values)
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_core::DataType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config(path: PathBuf) -> CsvConfig {
        CsvConfig {
            path,
            delimiter: ',',
            encoding: "utf-8".to_string(),
            has_headers: true,
        }
    }

    #[test]
    fn test_parse_infers_column_types() {
        let data = b"order_id,quantity,price,paid,note\nA1,5,29.99,true,\nA2,2,10,FALSE,rush\n";
        let records = parse_csv(data, b',', true).unwrap();

        assert_eq!(records.row_count(), 2);
        assert_eq!(records.column("order_id").unwrap().dtype(), DataType::Text);
        assert_eq!(records.column("quantity").unwrap().dtype(), DataType::Integer);
        assert_eq!(records.column("price").unwrap().dtype(), DataType::Float);
        assert_eq!(records.column("paid").unwrap().values()[1], Value::Boolean(false));
        assert!(records.column("note").unwrap().values()[0].is_null());
    }

    #[test]
    fn test_parse_strips_bom_and_honours_delimiter() {
        let data = b"\xEF\xBB\xBFid;name\n1;Ada\n";
        let records = parse_csv(data, b';', true).unwrap();
        assert_eq!(records.column_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_parse_without_headers() {
        let records = parse_csv(b"1,a\n2,b\n", b',', false).unwrap();
        assert_eq!(records.column_names(), vec!["column_1", "column_2"]);
        assert_eq!(records.row_count(), 2);
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let err = parse_csv(b"a,b\n1,2,3\n", b',', true).unwrap_err();
        assert!(matches!(err, Error::InvalidSourceFormat(_)));
    }

    #[test]
    fn test_non_utf8_encoding_is_rejected() {
        let mut config = config(PathBuf::from("orders.csv"));
        config.encoding = "latin-1".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_fetch_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,quantity").unwrap();
        writeln!(file, "A1,3").unwrap();

        let mut source = CsvSource::new("csv", config(file.path().to_path_buf()));
        let records = source.fetch(&CancellationToken::new()).await.unwrap();

        assert_eq!(records.row_count(), 1);
        assert_eq!(source.status().records_fetched, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = CsvSource::new("csv", config(dir.path().join("missing.csv")));

        let err = source.fetch(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(source.status().errors, 1);
    }
}
