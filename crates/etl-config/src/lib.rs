//! Pipeline configuration loading.
//!
//! A YAML document is parsed, `${VAR}` / `${VAR:default}` placeholders in
//! its string values are resolved against the process environment, and
//! `ETL__SECTION__KEY` variables are overlaid before the result is
//! deserialized.
//!
//! Substituted values always stay strings. Typed settings such as a port
//! take a literal or an `ETL__` override, which is parsed as a scalar.

use config::{Environment, Source};
use etl_core::{Error, PipelineConfig, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "ETL";

/// Separator between nested keys in override variable names.
pub const ENV_SEPARATOR: &str = "__";

static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").expect("valid env var regex")
});

/// Load and resolve a pipeline configuration file.
pub fn load(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.display().to_string()));
    }

    info!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

/// Resolve a configuration document held in memory.
pub fn load_from_str(content: &str) -> Result<PipelineConfig> {
    resolve(
        content,
        Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
    )
}

fn resolve(content: &str, environment: Environment) -> Result<PipelineConfig> {
    let mut document: Value = serde_yaml::from_str(content)
        .map_err(|e| Error::ConfigParse(format!("Invalid YAML: {}", e)))?;

    substitute_strings(&mut document);
    apply_overrides(&mut document, environment)?;

    serde_json::from_value(document).map_err(|e| Error::ConfigParse(e.to_string()))
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
///
/// An unset variable without a default becomes an empty string.
pub fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_RE
        .replace_all(input, |caps: &regex::Captures| {
            let name = caps[1].trim();
            match (std::env::var(name), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => {
                    warn!("Environment variable {} is not set, substituting empty string", name);
                    String::new()
                }
            }
        })
        .into_owned()
}

// Only string leaves are rewritten, so comments and keys are left alone.
fn substitute_strings(node: &mut Value) {
    match node {
        Value::String(text) if ENV_VAR_RE.is_match(text) => {
            *text = substitute_env_vars(text);
        }
        Value::Array(items) => items.iter_mut().for_each(substitute_strings),
        Value::Object(map) => map.values_mut().for_each(substitute_strings),
        _ => {}
    }
}

fn apply_overrides(document: &mut Value, environment: Environment) -> Result<()> {
    let overrides = environment
        .collect()
        .map_err(|e| Error::ConfigParse(format!("Invalid environment override: {}", e)))?;

    let mut overrides: Vec<_> = overrides.into_iter().collect();
    overrides.sort_by(|a, b| a.0.cmp(&b.0));

    for (key, value) in overrides {
        let raw = value
            .into_string()
            .map_err(|e| Error::ConfigParse(format!("Invalid value for {}: {}", key, e)))?;
        debug!("Overriding {} from environment", key);

        let path: Vec<&str> = key.split('.').collect();
        set_path(document, &path, parse_scalar(&raw));
    }

    Ok(())
}

// Environment keys arrive lowercased, so existing keys match case-insensitively.
fn set_path(node: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    let key = map
        .keys()
        .find(|existing| existing.eq_ignore_ascii_case(head))
        .cloned()
        .unwrap_or_else(|| head.to_string());
    set_path(map.entry(key).or_insert(Value::Null), rest, value);
}

fn parse_scalar(raw: &str) -> Value {
    serde_yaml::from_str::<Value>(raw)
        .ok()
        .filter(|value| !value.is_object() && !value.is_array())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Render a resolved configuration back to YAML.
pub fn to_yaml(config: &PipelineConfig) -> Result<String> {
    serde_yaml::to_string(config).map_err(|e| Error::ConfigParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_core::{ErrorHandling, TargetType, WriteMode};

    const PIPELINE: &str = r#"
pipeline:
  name: nightly-orders
  error_handling: skip
sources:
  csv:
    type: csv
    config:
      path: ${ETL_TEST_DATA_DIR:data}/orders.csv
  api:
    type: api
    config:
      base_url: https://api.example.com
      endpoint: orders
      headers:
        Authorization: Bearer ${ETL_TEST_TOKEN}
transformations:
  required_columns: [order_id, quantity]
  data_types:
    quantity: integer
database:
  type: sqlite
  config:
    path: data/etl.db
output:
  table_name: orders
  write_mode: replace
"#;

    fn no_overrides() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .source(Some(config::Map::new()))
    }

    #[test]
    fn test_substitution_with_defaults() {
        std::env::set_var("ETL_TEST_SUB_HOST", "db.internal");
        std::env::remove_var("ETL_TEST_SUB_MISSING");

        let result = substitute_env_vars(
            "host: ${ETL_TEST_SUB_HOST}\nport: ${ETL_TEST_SUB_MISSING:5432}\nuser: ${ETL_TEST_SUB_MISSING}",
        );
        assert_eq!(result, "host: db.internal\nport: 5432\nuser: ");

        std::env::remove_var("ETL_TEST_SUB_HOST");
    }

    #[test]
    fn test_set_variable_wins_over_default() {
        std::env::set_var("ETL_TEST_SUB_PORT", "6543");
        assert_eq!(substitute_env_vars("${ETL_TEST_SUB_PORT:5432}"), "6543");
        std::env::remove_var("ETL_TEST_SUB_PORT");
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        let input = "plain: value\nprice: $5";
        assert_eq!(substitute_env_vars(input), input);
    }

    #[test]
    fn test_resolve_pipeline() {
        std::env::set_var("ETL_TEST_TOKEN", "abc123");
        std::env::remove_var("ETL_TEST_DATA_DIR");

        let config = resolve(PIPELINE, no_overrides()).unwrap();

        assert_eq!(config.pipeline.name, "nightly-orders");
        assert_eq!(config.pipeline.error_handling, ErrorHandling::Skip);
        assert_eq!(config.sources.keys().collect::<Vec<_>>(), vec!["api", "csv"]);
        assert_eq!(config.sources["csv"].config["path"], "data/orders.csv");
        assert_eq!(
            config.sources["api"].config["headers"]["Authorization"],
            "Bearer abc123"
        );
        assert_eq!(config.transformations.data_types["quantity"], TargetType::Integer);
        assert_eq!(config.output.write_mode, WriteMode::Replace);
        assert!((config.quality.max_null_percentage - 0.05).abs() < f64::EPSILON);

        std::env::remove_var("ETL_TEST_TOKEN");
    }

    #[test]
    fn test_substituted_values_are_kept_verbatim() {
        std::env::set_var("ETL_TEST_VERBATIM_PASSWORD", "s3cret #1");
        std::env::set_var("ETL_TEST_VERBATIM_PIN", "012345");
        std::env::set_var("ETL_TEST_VERBATIM_PATH", "exports: daily/orders.csv");

        let yaml = r#"
sources:
  csv:
    type: csv
    config:
      path: ${ETL_TEST_VERBATIM_PATH}
      # path: ${ETL_TEST_VERBATIM_UNSET_IN_COMMENT}
database:
  type: postgresql
  config:
    password: ${ETL_TEST_VERBATIM_PASSWORD}
    username: ${ETL_TEST_VERBATIM_PIN}
"#;
        let config = resolve(yaml, no_overrides()).unwrap();

        assert_eq!(
            config.sources["csv"].config["path"],
            Value::from("exports: daily/orders.csv")
        );
        assert_eq!(config.database.config["password"], Value::from("s3cret #1"));
        assert_eq!(config.database.config["username"], Value::from("012345"));

        std::env::remove_var("ETL_TEST_VERBATIM_PASSWORD");
        std::env::remove_var("ETL_TEST_VERBATIM_PIN");
        std::env::remove_var("ETL_TEST_VERBATIM_PATH");
    }

    #[test]
    fn test_all_digit_secret_stays_a_string() {
        std::env::set_var("ETL_TEST_DIGIT_PASSWORD", "12345");

        let mut document = serde_json::json!({
            "config": {"password": "${ETL_TEST_DIGIT_PASSWORD}", "port": 5432},
            "tags": ["${ETL_TEST_DIGIT_PASSWORD}"]
        });
        substitute_strings(&mut document);

        assert_eq!(document["config"]["password"], Value::String("12345".into()));
        assert_eq!(document["config"]["port"], Value::from(5432));
        assert_eq!(document["tags"][0], Value::String("12345".into()));

        std::env::remove_var("ETL_TEST_DIGIT_PASSWORD");
    }

    #[test]
    fn test_environment_overrides() {
        let mut vars = config::Map::new();
        vars.insert("ETL__PIPELINE__ERROR_HANDLING".to_string(), "rollback".to_string());
        vars.insert("ETL__QUALITY__MAX_NULL_PERCENTAGE".to_string(), "0.2".to_string());
        vars.insert("ETL__OUTPUT__TABLE_NAME".to_string(), "orders_staging".to_string());
        vars.insert("OTHER__OUTPUT__TABLE_NAME".to_string(), "ignored".to_string());
        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .source(Some(vars));

        let config = resolve(PIPELINE, environment).unwrap();

        assert_eq!(config.pipeline.error_handling, ErrorHandling::Rollback);
        assert!((config.quality.max_null_percentage - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.output.table_name, "orders_staging");
    }

    #[test]
    fn test_set_path_matches_existing_keys() {
        let mut document = serde_json::json!({"sources": {"Orders": {"config": {}}}});
        set_path(
            &mut document,
            &["sources", "orders", "config", "delimiter"],
            Value::from(";"),
        );
        assert_eq!(document["sources"]["Orders"]["config"]["delimiter"], ";");
    }

    #[test]
    fn test_parse_scalar() {
        assert_eq!(parse_scalar("true"), Value::Bool(true));
        assert_eq!(parse_scalar("42"), Value::from(42));
        assert_eq!(parse_scalar("orders"), Value::from("orders"));
        assert_eq!(parse_scalar("[a, b]"), Value::from("[a, b]"));
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            resolve("sources: [unclosed", no_overrides()),
            Err(Error::ConfigParse(_))
        ));
        assert!(matches!(
            resolve("pipeline:\n  name: missing-sources\n", no_overrides()),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_file_and_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "sources:\n  events:\n    type: json\n    config:\n      path: events.json\ndatabase:\n  type: sqlite\n  config:\n    path: etl.db\n",
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.output.table_name, "orders");

        let yaml = to_yaml(&config).unwrap();
        assert!(yaml.contains("events"));
        assert!(yaml.contains("table_name: orders"));
    }
}
