use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::{
    config::ApiConfig,
    model::{RawWeatherPayload, iso_now},
};

use super::{ExtractError, WeatherSource};

/// Fetches current conditions for one coordinate pair from an
/// Open-Meteo style `forecast` endpoint.
#[derive(Debug, Clone)]
pub struct OpenMeteoExtractor {
    base_url: String,
    latitude: f64,
    longitude: f64,
    params: Vec<String>,
    timeout: Duration,
    http: Client,
}

impl OpenMeteoExtractor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        base_url: impl Into<String>,
        latitude: f64,
        longitude: f64,
        params: Vec<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            latitude,
            longitude,
            params,
            timeout: Self::DEFAULT_TIMEOUT,
            http: Client::new(),
        }
    }

    pub fn from_config(api: &ApiConfig) -> Self {
        Self::new(api.base_url.clone(), api.latitude, api.longitude, api.params.clone())
            .with_timeout(Duration::from_secs(api.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn query(&self) -> [(&'static str, String); 3] {
        [
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("current", self.params.join(",")),
        ]
    }

    async fn fetch(&self) -> Result<RawWeatherPayload, ExtractError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&self.query())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ExtractError::Request)?;

        let status = res.status();
        let body = res.text().await.map_err(ExtractError::Request)?;

        if !status.is_success() {
            return Err(ExtractError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        match serde_json::from_str::<Value>(&body).map_err(ExtractError::Parse)? {
            Value::Object(fields) => {
                let mut payload = RawWeatherPayload::new(fields);
                payload.mark_extracted(iso_now());
                Ok(payload)
            }
            _ => Err(ExtractError::NotAnObject),
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoExtractor {
    async fn extract(&self) -> Result<RawWeatherPayload, ExtractError> {
        tracing::info!(
            message = "starting extraction",
            latitude = self.latitude,
            longitude = self.longitude,
            url = %self.base_url,
        );

        match self.fetch().await {
            Ok(payload) => {
                tracing::info!("extraction completed");
                Ok(payload)
            }
            Err(e) => {
                tracing::error!(
                    message = "extraction failed",
                    error = %e,
                    timeout = e.is_timeout(),
                );
                Err(e)
            }
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::WeatherTransformer;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const OBSERVATION: &str = concat!(
        r#"{"latitude":-23.5,"longitude":-46.6,"current":{"temperature_2m":21.3,"#,
        r#""precipitation":0.0,"weather_code":3,"wind_speed_10m":12.1,"#,
        r#""relative_humidity_2m":70}}"#,
    );

    /// Serve a single canned HTTP response and record the request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, Arc<Mutex<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_task = seen.clone();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = sock.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]);
            *seen_in_task.lock().unwrap() = request.lines().next().unwrap_or_default().to_string();

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.unwrap();
        });

        (format!("http://{addr}/v1/forecast"), seen)
    }

    fn extractor(url: String) -> OpenMeteoExtractor {
        OpenMeteoExtractor::new(
            url,
            -23.5,
            -46.6,
            vec!["temperature_2m".into(), "precipitation".into(), "weather_code".into()],
        )
    }

    #[tokio::test]
    async fn extract_returns_body_with_metadata() {
        let (url, seen) = serve_once("200 OK", OBSERVATION).await;

        let payload = extractor(url).extract().await.expect("extraction should succeed");

        assert_eq!(payload.get("latitude"), Some(&serde_json::json!(-23.5)));
        assert_eq!(payload.get("current").unwrap()["weather_code"], 3);
        assert!(payload.extraction_timestamp().is_some());
        assert_eq!(
            payload.get(RawWeatherPayload::EXTRACTION_SUCCESS),
            Some(&Value::Bool(true))
        );

        let request_line = seen.lock().unwrap().clone();
        assert!(request_line.starts_with("GET /v1/forecast?"));
        assert!(request_line.contains("latitude=-23.5"));
        assert!(request_line.contains("longitude=-46.6"));
        assert!(request_line.contains("current=temperature_2m%2Cprecipitation%2Cweather_code"));
    }

    #[tokio::test]
    async fn extracted_payload_flattens_into_record() {
        let (url, _) = serve_once("200 OK", OBSERVATION).await;

        let payload = extractor(url).extract().await.unwrap();
        let record = WeatherTransformer::new().transform(&payload).unwrap();

        assert_eq!(record.latitude, Some(-23.5));
        assert_eq!(record.longitude, Some(-46.6));
        assert_eq!(record.temperature_celsius, Some(21.3));
        assert_eq!(record.precipitation_mm, Some(0.0));
        assert_eq!(record.weather_code, Some(3));
        assert_eq!(record.weather_description, "Cloudy");
        assert_eq!(record.wind_speed_kmh, Some(12.1));
        assert_eq!(record.relative_humidity, Some(70.0));
        assert_eq!(
            record.extraction_timestamp.as_deref(),
            payload.extraction_timestamp()
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, _) = serve_once("500 Internal Server Error", r#"{"error":true}"#).await;

        let err = extractor(url).extract().await.unwrap_err();

        match err {
            ExtractError::Status { status, body } => {
                assert_eq!(status.as_u16(), 500);
                assert!(body.contains("error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_an_error() {
        let (url, _) = serve_once("200 OK", "<html>not json</html>").await;

        let err = extractor(url).extract().await.unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[tokio::test]
    async fn non_object_body_is_an_error() {
        let (url, _) = serve_once("200 OK", "[1, 2, 3]").await;

        let err = extractor(url).extract().await.unwrap_err();
        assert!(matches!(err, ExtractError::NotAnObject));
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = extractor(format!("http://{addr}/"))
            .with_timeout(Duration::from_millis(100))
            .extract()
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = extractor(format!("http://{addr}/")).extract().await.unwrap_err();
        assert!(matches!(err, ExtractError::Request(_)));
    }

    #[test]
    fn from_config_uses_configured_timeout() {
        let api = ApiConfig {
            timeout_secs: 3,
            ..ApiConfig::default()
        };
        let extractor = OpenMeteoExtractor::from_config(&api);
        assert_eq!(extractor.timeout, Duration::from_secs(3));
        assert_eq!(extractor.query()[2].1, api.params.join(","));
    }

    #[test]
    fn truncate_body_limits_length() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert_eq!(truncated.len(), 203);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_body("short"), "short");
    }
}
