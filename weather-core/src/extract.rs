use crate::model::RawWeatherPayload;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt::Debug;
use thiserror::Error;

pub mod open_meteo;

pub use open_meteo::OpenMeteoExtractor;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request to weather API failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("weather API responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse weather API response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("weather API response is not a JSON object")]
    NotAnObject,
}

impl ExtractError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}

/// Anything that can produce one raw observation payload per call.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// Single attempt, no retries. Failures are logged before being returned.
    async fn extract(&self) -> Result<RawWeatherPayload, ExtractError>;
}
