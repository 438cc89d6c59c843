mod logging;

use clap::{Parser, Subcommand};
use etl_core::{Orchestrator, PipelineConfig, Registry};
use etl_file_source::{CsvSourceFactory, JsonSourceFactory};
use etl_http_source::ApiSourceFactory;
use etl_sql_sink::{PostgresSinkFactory, SqliteSinkFactory};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "etl-cli")]
#[command(about = "Batch ETL pipeline CLI", long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(short, long, global = true, default_value = "config/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline: extract, transform and load
    Run {
        /// Only process this source
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Validate the configuration file
    Validate {
        /// Print the resolved configuration
        #[arg(long)]
        show: bool,
    },

    /// Extract and transform without loading, printing data profiles as JSON
    Profile {
        /// Only profile this source
        #[arg(short, long)]
        source: Option<String>,
    },
}

fn build_registry() -> Registry {
    let mut registry = Registry::new();

    registry.register_source(Arc::new(CsvSourceFactory));
    registry.register_source(Arc::new(JsonSourceFactory));
    registry.register_source(Arc::new(ApiSourceFactory));

    registry.register_sink(Arc::new(SqliteSinkFactory));
    registry.register_sink(Arc::new(PostgresSinkFactory));

    registry
}

/// Token cancelled on Ctrl+C so the run can stop at the next stage boundary.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {}", e);
                    return;
                }
                info!("Shutdown requested, cancelling run");
                child.cancel();
            }
            _ = child.cancelled() => {}
        }
    });
    token
}

fn print_overview(config: &PipelineConfig) {
    println!("Pipeline: {}", config.pipeline.name);
    println!("Error handling: {:?}", config.pipeline.error_handling);

    println!("\nSources: {}", config.sources.len());
    for (name, source) in &config.sources {
        println!("  • {} ({})", name, source.source_type);
    }

    println!("\nDatabase: {}", config.database.sink_type);
    println!(
        "Output: table '{}' ({})",
        config.output.table_name, config.output.write_mode
    );
}

async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let config = etl_config::load(&cli.config)?;
    let _guard = logging::init_logging(&config.pipeline)?;
    let registry = build_registry();

    info!("Available sources: {:?}", registry.source_types());
    info!("Available sinks: {:?}", registry.sink_types());

    match cli.command {
        Commands::Validate { show } => {
            info!("Validating configuration: {}", cli.config.display());

            if let Err(e) = config.validate(&registry) {
                println!("✗ Configuration is invalid: {}", e);
                return Ok(false);
            }

            println!("✓ Configuration is valid\n");
            print_overview(&config);
            if show {
                println!("\n{}", etl_config::to_yaml(&config)?);
            }
            Ok(true)
        }

        Commands::Run { source } => {
            config.validate(&registry)?;
            let mut orchestrator = Orchestrator::from_config(config, &registry)?;
            let cancel = shutdown_token();

            let report = orchestrator.run(source.as_deref(), &cancel).await;
            cancel.cancel();

            println!("{}", serde_json::to_string_pretty(&report.summary)?);
            if let Some(e) = &report.error {
                error!("Run failed during {}: {}", e.stage(), e);
            }
            Ok(report.is_success())
        }

        Commands::Profile { source } => {
            config.validate(&registry)?;
            let mut orchestrator = Orchestrator::from_config(config, &registry)?;
            let cancel = shutdown_token();

            let profiles = orchestrator.profile(source.as_deref(), &cancel).await;
            cancel.cancel();

            println!("{}", serde_json::to_string_pretty(&profiles?)?);
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["etl-cli", "run", "--source", "csv"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/config.yaml"));
        assert!(matches!(cli.command, Commands::Run { source: Some(ref s) } if s == "csv"));

        let cli =
            Cli::try_parse_from(["etl-cli", "validate", "--show", "--config", "etl.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("etl.yaml"));
        assert!(matches!(cli.command, Commands::Validate { show: true }));

        assert!(Cli::try_parse_from(["etl-cli", "deploy"]).is_err());
    }

    #[test]
    fn test_registry_knows_every_collaborator() {
        let registry = build_registry();
        assert_eq!(registry.source_types(), vec!["api", "csv", "json"]);
        assert_eq!(registry.sink_types(), vec!["postgresql", "sqlite"]);
    }

    #[tokio::test]
    async fn test_run_end_to_end_with_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("orders.csv");
        let db_path = dir.path().join("etl.db");
        std::fs::write(
            &csv_path,
            "Order ID,Quantity,Unit Price,Order Date\nA1,5,29.99,2024-01-15\nA2,1,10.00,2024-01-16\nA2,1,10.00,2024-01-16\n",
        )
        .unwrap();

        let yaml = format!(
            r#"
sources:
  csv:
    type: csv
    config:
      path: {}
transformations:
  required_columns: [order_id, quantity]
  data_types:
    quantity: integer
    unit_price: float
  date_columns: [order_date]
  enrichment:
    price_column: unit_price
database:
  type: sqlite
  config:
    path: {}
"#,
            csv_path.display(),
            db_path.display()
        );
        let config = etl_config::load_from_str(&yaml).unwrap();
        let registry = build_registry();
        config.validate(&registry).unwrap();

        let mut orchestrator = Orchestrator::from_config(config, &registry).unwrap();
        let report = orchestrator.run(None, &CancellationToken::new()).await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.summary.records_extracted, 3);
        assert_eq!(report.summary.records_loaded, 2);
    }
}
