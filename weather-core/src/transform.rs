use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{RawWeatherPayload, WeatherRecord, iso_now};

/// Description used for codes missing from [`WEATHER_CODES`].
pub const UNKNOWN_DESCRIPTION: &str = "Unknown";

/// WMO weather interpretation codes understood by the transformer.
pub const WEATHER_CODES: [(i64, &str); 16] = [
    (0, "Clear sky"),
    (1, "Mainly clear"),
    (2, "Partly cloudy"),
    (3, "Cloudy"),
    (45, "Fog"),
    (48, "Depositing rime fog"),
    (51, "Light drizzle"),
    (53, "Moderate drizzle"),
    (55, "Dense drizzle"),
    (61, "Light rain"),
    (63, "Moderate rain"),
    (65, "Heavy rain"),
    (71, "Light snow"),
    (73, "Moderate snow"),
    (75, "Heavy snow"),
    (95, "Thunderstorm"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("raw payload is empty")]
    EmptyPayload,
    #[error("raw payload has no `current` section")]
    MissingCurrent,
    #[error("`current` section is not a mapping")]
    InvalidCurrent,
}

/// Flattens a raw API payload into a single [`WeatherRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherTransformer;

impl WeatherTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn describe(code: Option<i64>) -> &'static str {
        code.and_then(|code| {
            WEATHER_CODES
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(_, description)| *description)
        })
        .unwrap_or(UNKNOWN_DESCRIPTION)
    }

    pub fn transform(&self, raw: &RawWeatherPayload) -> Result<WeatherRecord, TransformError> {
        tracing::info!("starting transformation");

        match build_record(raw) {
            Ok(record) => {
                tracing::info!(message = "transformation completed", rows = 1);
                Ok(record)
            }
            Err(e) => {
                tracing::error!(message = "invalid raw payload", error = %e);
                Err(e)
            }
        }
    }
}

fn build_record(raw: &RawWeatherPayload) -> Result<WeatherRecord, TransformError> {
    if raw.is_empty() {
        return Err(TransformError::EmptyPayload);
    }

    let current = match raw.get("current") {
        Some(Value::Object(current)) => current,
        Some(_) => return Err(TransformError::InvalidCurrent),
        None => return Err(TransformError::MissingCurrent),
    };

    let weather_code = code(current, "weather_code");

    Ok(WeatherRecord {
        timestamp: iso_now(),
        latitude: number(raw.fields(), "latitude"),
        longitude: number(raw.fields(), "longitude"),
        temperature_celsius: number(current, "temperature_2m"),
        precipitation_mm: number(current, "precipitation"),
        weather_code,
        weather_description: WeatherTransformer::describe(weather_code).to_string(),
        wind_speed_kmh: number(current, "wind_speed_10m"),
        relative_humidity: number(current, "relative_humidity_2m"),
        extraction_timestamp: raw.extraction_timestamp().map(str::to_string),
    })
}

// Numbers are copied as-is and numeric strings are parsed. Anything else
// present is dropped with a warning.
fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = fields.get(key)?;
    let parsed = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if parsed.is_none() {
        tracing::warn!(message = "dropping non-numeric value", key, value = %value);
    }
    parsed
}

// Integral floats such as `3.0` are accepted as codes.
fn code(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = fields.get(key)?;
    if value.is_null() {
        return None;
    }
    let parsed = value.as_i64().or_else(|| {
        number(fields, key)
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    });
    if parsed.is_none() {
        tracing::warn!(message = "dropping non-integer weather code", key, value = %value);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> RawWeatherPayload {
        match value {
            Value::Object(fields) => RawWeatherPayload::new(fields),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn flattens_current_conditions() {
        let raw = payload(json!({
            "latitude": -23.5,
            "longitude": -46.6,
            "current": {
                "temperature_2m": 21.3,
                "precipitation": 0.0,
                "weather_code": 3,
                "wind_speed_10m": 12.1,
                "relative_humidity_2m": 70
            },
            "extraction_timestamp": "2024-01-01T00:00:00"
        }));

        let record = WeatherTransformer::new().transform(&raw).expect("transform should succeed");

        assert_eq!(record.latitude, Some(-23.5));
        assert_eq!(record.longitude, Some(-46.6));
        assert_eq!(record.temperature_celsius, Some(21.3));
        assert_eq!(record.precipitation_mm, Some(0.0));
        assert_eq!(record.weather_code, Some(3));
        assert_eq!(record.weather_description, "Cloudy");
        assert_eq!(record.wind_speed_kmh, Some(12.1));
        assert_eq!(record.relative_humidity, Some(70.0));
        assert_eq!(record.extraction_timestamp.as_deref(), Some("2024-01-01T00:00:00"));
        assert!(!record.timestamp.is_empty());
    }

    #[test]
    fn unmapped_code_is_unknown() {
        let raw = payload(json!({"current": {"weather_code": 999}}));

        let record = WeatherTransformer::new().transform(&raw).unwrap();

        assert_eq!(record.weather_code, Some(999));
        assert_eq!(record.weather_description, UNKNOWN_DESCRIPTION);
    }

    #[test]
    fn integral_float_code_is_described() {
        let raw = payload(json!({"current": {"weather_code": 3.0}}));

        let record = WeatherTransformer::new().transform(&raw).unwrap();

        assert_eq!(record.weather_code, Some(3));
        assert_eq!(record.weather_description, "Cloudy");
    }

    #[test]
    fn numeric_strings_are_copied() {
        let raw = payload(json!({
            "latitude": "-23.5",
            "current": {"relative_humidity_2m": "70", "weather_code": "61"}
        }));

        let record = WeatherTransformer::new().transform(&raw).unwrap();

        assert_eq!(record.latitude, Some(-23.5));
        assert_eq!(record.relative_humidity, Some(70.0));
        assert_eq!(record.weather_code, Some(61));
        assert_eq!(record.weather_description, "Light rain");
    }

    #[test]
    fn unusable_values_become_null() {
        let raw = payload(json!({
            "current": {"temperature_2m": "warm", "weather_code": 2.5, "precipitation": [0.1]}
        }));

        let record = WeatherTransformer::new().transform(&raw).unwrap();

        assert_eq!(record.temperature_celsius, None);
        assert_eq!(record.precipitation_mm, None);
        assert_eq!(record.weather_code, None);
        assert_eq!(record.weather_description, UNKNOWN_DESCRIPTION);
    }

    #[test]
    fn missing_fields_become_null() {
        let raw = payload(json!({"current": {"temperature_2m": null}}));

        let record = WeatherTransformer::new().transform(&raw).unwrap();

        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
        assert_eq!(record.temperature_celsius, None);
        assert_eq!(record.precipitation_mm, None);
        assert_eq!(record.weather_code, None);
        assert_eq!(record.weather_description, UNKNOWN_DESCRIPTION);
        assert_eq!(record.wind_speed_kmh, None);
        assert_eq!(record.relative_humidity, None);
        assert_eq!(record.extraction_timestamp, None);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = WeatherTransformer::new()
            .transform(&RawWeatherPayload::default())
            .unwrap_err();
        assert_eq!(err, TransformError::EmptyPayload);
    }

    #[test]
    fn payload_without_current_is_rejected() {
        let raw = payload(json!({"latitude": 1.0, "extraction_success": true}));
        let err = WeatherTransformer::new().transform(&raw).unwrap_err();
        assert_eq!(err, TransformError::MissingCurrent);
    }

    #[test]
    fn non_mapping_current_is_rejected() {
        let raw = payload(json!({"current": [21.3]}));
        let err = WeatherTransformer::new().transform(&raw).unwrap_err();
        assert_eq!(err, TransformError::InvalidCurrent);
    }

    #[test]
    fn code_table_has_sixteen_distinct_entries() {
        let mut codes: Vec<_> = WEATHER_CODES.iter().map(|(code, _)| *code).collect();
        codes.dedup();
        assert_eq!(codes.len(), 16);

        for (code, description) in WEATHER_CODES {
            assert_eq!(WeatherTransformer::describe(Some(code)), description);
        }
        assert_eq!(WeatherTransformer::describe(None), UNKNOWN_DESCRIPTION);
    }
}
