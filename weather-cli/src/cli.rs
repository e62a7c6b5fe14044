use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::Level;
use weather_etl_core::{
    Config, OpenMeteoExtractor, OutputFormat, WeatherLoader, WeatherTransformer, pipeline,
};

use crate::logging;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Fetch current weather and store it as CSV/JSON")]
pub struct Cli {
    /// Config file. Defaults to ./config/config.toml, then the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one extract, transform and load cycle.
    Run {
        /// Overrides the configured level: trace, debug, info, warn or error.
        #[arg(long)]
        log_level: Option<Level>,
    },

    /// Interactively write the config file.
    Configure,

    /// Print the resolved config path and effective settings.
    ShowConfig,
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        let path = Config::resolve_path(self.config.as_deref())?;

        match self.command {
            Command::Run { log_level } => run_pipeline(&path, log_level).await,
            Command::Configure => {
                configure(&path)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::ShowConfig => {
                let config = Config::load(&path)?;
                let toml = toml::to_string_pretty(&config)
                    .context("Failed to serialize configuration to TOML")?;
                println!("# {}\n{toml}", path.display());
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

async fn run_pipeline(path: &Path, log_level: Option<Level>) -> Result<ExitCode> {
    let config = Config::load(path)?;
    let _guard = logging::init(&config.logging, log_level)?;

    tracing::info!("{}", "=".repeat(50));
    tracing::info!(message = "starting weather ETL pipeline", config = %path.display());
    tracing::info!("{}", "=".repeat(50));

    let extractor = OpenMeteoExtractor::from_config(&config.api);
    let transformer = WeatherTransformer::new();
    let loader = match WeatherLoader::new(&config.output.raw_dir, &config.output.processed_dir) {
        Ok(loader) => loader,
        Err(e) => {
            tracing::error!(message = "unable to prepare output directories", error = %e);
            return Ok(ExitCode::FAILURE);
        }
    };

    match pipeline::run(&extractor, &transformer, &loader, &config.output).await {
        Ok(report) if report.is_success() => {
            tracing::info!("{}", "=".repeat(50));
            tracing::info!(
                message = "pipeline completed successfully",
                records = 1,
                description = %report.record.weather_description,
            );
            tracing::info!("{}", "=".repeat(50));
            Ok(ExitCode::SUCCESS)
        }
        Ok(_) => {
            tracing::warn!("pipeline completed with warnings, check the logs");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            tracing::error!(message = "pipeline aborted", error = %e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn configure(path: &Path) -> Result<()> {
    let mut config = Config::load(path)?;

    config.api.base_url = Text::new("API base URL:")
        .with_default(&config.api.base_url)
        .prompt()?;

    config.api.latitude = CustomType::<f64>::new("Latitude:")
        .with_default(config.api.latitude)
        .with_error_message("Please enter a decimal number, e.g. -23.55")
        .prompt()?;

    config.api.longitude = CustomType::<f64>::new("Longitude:")
        .with_default(config.api.longitude)
        .with_error_message("Please enter a decimal number, e.g. -46.63")
        .prompt()?;

    let params = Text::new("Current-weather parameters (comma separated):")
        .with_default(&config.api.params.join(","))
        .prompt()?;
    config.api.params = parse_params(&params);

    let formats = vec![OutputFormat::Csv, OutputFormat::Json];
    let cursor = formats
        .iter()
        .position(|f| f.as_str() == config.output.processed_format.to_lowercase())
        .unwrap_or(0);
    config.output.processed_format = Select::new("Processed output format:", formats)
        .with_starting_cursor(cursor)
        .prompt()?
        .to_string();

    config.save(path)?;
    println!("Configuration saved to {}", path.display());

    Ok(())
}

fn parse_params(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
