//! Core library for the `weather-etl` job.
//!
//! This crate defines:
//! - Configuration loading and saving
//! - The extract, transform and load stages
//! - Shared data model (raw payload, flat record, historical table)
//! - The driving routine that chains the stages for one run
//!
//! It is used by the `weather-etl` binary, but the stages can be driven
//! individually as well.

pub mod config;
pub mod extract;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod transform;

pub use config::{ApiConfig, Config, LoggingConfig, OutputConfig};
pub use extract::{ExtractError, OpenMeteoExtractor, WeatherSource};
pub use load::{LoadError, OutputFormat, WeatherLoader};
pub use model::{HistoricalTable, RawWeatherPayload, WeatherRecord};
pub use pipeline::{PipelineError, RunReport};
pub use transform::{TransformError, WeatherTransformer};
