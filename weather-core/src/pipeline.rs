//! One extract → transform → load run.
//!
//! Extract and transform failures abort the run. The three load operations
//! are always all attempted and reported individually; files written before a
//! failure are left in place.

use std::path::PathBuf;
use thiserror::Error;

use crate::{
    config::OutputConfig,
    extract::{ExtractError, WeatherSource},
    load::{LoadError, WeatherLoader},
    model::WeatherRecord,
    transform::{TransformError, WeatherTransformer},
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("transformation failed: {0}")]
    Transform(#[from] TransformError),
}

/// Outcome of the load stage.
#[derive(Debug)]
pub struct RunReport {
    pub record: WeatherRecord,
    pub raw: Result<PathBuf, LoadError>,
    pub processed: Result<PathBuf, LoadError>,
    /// Total rows in the historical file after the append.
    pub historical: Result<usize, LoadError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.raw.is_ok() && self.processed.is_ok() && self.historical.is_ok()
    }
}

pub async fn run<S>(
    source: &S,
    transformer: &WeatherTransformer,
    loader: &WeatherLoader,
    output: &OutputConfig,
) -> Result<RunReport, PipelineError>
where
    S: WeatherSource + ?Sized,
{
    tracing::info!("phase 1: extract");
    let raw = source.extract().await.inspect_err(|_| {
        tracing::error!("extraction failed, aborting pipeline");
    })?;

    tracing::info!("phase 2: transform");
    let record = transformer.transform(&raw).inspect_err(|_| {
        tracing::error!("transformation failed, aborting pipeline");
    })?;

    tracing::info!("phase 3: load");
    let records = std::slice::from_ref(&record);

    let raw_saved = WeatherLoader::parse_format(&output.raw_format)
        .and_then(|format| loader.save_raw_data(&raw, format));
    let processed_saved = WeatherLoader::parse_format(&output.processed_format)
        .and_then(|format| loader.save_processed_data(records, format));
    let historical_saved = loader.append_to_historical(records, &output.historical_file);

    Ok(RunReport {
        record,
        raw: raw_saved,
        processed: processed_saved,
        historical: historical_saved,
    })
}
