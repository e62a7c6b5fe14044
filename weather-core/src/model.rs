use chrono::Local;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use serde_json::{Map, Value};
use std::{fs::File, io, path::Path};

/// ISO-8601 layout used for every timestamp stored in a record.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Current local time as an ISO-8601 string.
pub fn iso_now() -> String {
    Local::now().format(ISO_FORMAT).to_string()
}

/// API response body as received, plus the fields added at extraction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawWeatherPayload(Map<String, Value>);

impl RawWeatherPayload {
    pub const EXTRACTION_TIMESTAMP: &'static str = "extraction_timestamp";
    pub const EXTRACTION_SUCCESS: &'static str = "extraction_success";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Stamp the payload with the extraction time and success flag.
    pub fn mark_extracted(&mut self, timestamp: String) {
        self.0.insert(Self::EXTRACTION_TIMESTAMP.to_string(), Value::String(timestamp));
        self.0.insert(Self::EXTRACTION_SUCCESS.to_string(), Value::Bool(true));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extraction_timestamp(&self) -> Option<&str> {
        self.get(Self::EXTRACTION_TIMESTAMP).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawWeatherPayload {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// One flattened observation. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub timestamp: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature_celsius: Option<f64>,
    pub precipitation_mm: Option<f64>,
    #[serde(default, deserialize_with = "lenient_code")]
    pub weather_code: Option<i64>,
    pub weather_description: String,
    pub wind_speed_kmh: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub extraction_timestamp: Option<String>,
}

// History files written by other tools may hold codes as `3.0` once the
// column has contained a blank.
fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i64),
        Float(f64),
        Text(String),
    }

    const EXPECTED: &str = "an integer weather code";

    let code = match Option::<Code>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Code::Int(code)) => return Ok(Some(code)),
        Some(Code::Float(code)) => code,
        Some(Code::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(Code::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::invalid_value(Unexpected::Str(&text), &EXPECTED))?,
    };

    if code.fract() == 0.0 && code.abs() < i64::MAX as f64 {
        Ok(Some(code as i64))
    } else {
        Err(D::Error::invalid_value(Unexpected::Float(code), &EXPECTED))
    }
}

/// Rows accumulated across runs, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalTable {
    rows: Vec<WeatherRecord>,
}

impl HistoricalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every row of an existing CSV file. The header must match
    /// [`WeatherRecord`]'s columns.
    pub fn read_csv(path: &Path) -> Result<Self, csv::Error> {
        let mut reader = csv::Reader::from_path(path)?;
        let rows = reader
            .deserialize::<WeatherRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    /// Append rows after the existing ones, keeping their order.
    pub fn extend<'a>(&mut self, rows: impl IntoIterator<Item = &'a WeatherRecord>) {
        self.rows.extend(rows.into_iter().cloned());
    }

    /// Overwrite `path` with a header line followed by every row.
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        write_records_csv(&self.rows, File::create(path)?)
    }

    pub fn rows(&self) -> &[WeatherRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<Vec<WeatherRecord>> for HistoricalTable {
    fn from(rows: Vec<WeatherRecord>) -> Self {
        Self { rows }
    }
}

/// Header row plus one line per record, no index column.
pub(crate) fn write_records_csv<W: io::Write>(
    records: &[WeatherRecord],
    out: W,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
