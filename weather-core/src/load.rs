use chrono::Local;
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::model::{HistoricalTable, RawWeatherPayload, WeatherRecord, write_records_csv};

pub const DEFAULT_HISTORICAL_FILE: &str = "weather_historical.csv";

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MAX_SNAPSHOT_SUFFIX: usize = 1000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported output format '{0}'")]
    UnsupportedFormat(String),
    #[error("no records to save")]
    EmptyTable,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io { path: path.to_path_buf(), source }
    }

    fn csv(path: &Path) -> impl FnOnce(csv::Error) -> Self + '_ {
        move |source| Self::Csv { path: path.to_path_buf(), source }
    }

    fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json { path: path.to_path_buf(), source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OutputFormat {
    type Error = LoadError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(LoadError::UnsupportedFormat(value.to_string())),
        }
    }
}

/// Writes raw snapshots, processed snapshots and the cumulative history.
#[derive(Debug, Clone)]
pub struct WeatherLoader {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl WeatherLoader {
    /// Both directories (and their parents) are created if missing.
    pub fn new(
        raw_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
    ) -> Result<Self, LoadError> {
        let raw_dir = raw_dir.into();
        let processed_dir = processed_dir.into();

        for dir in [&raw_dir, &processed_dir] {
            fs::create_dir_all(dir).map_err(LoadError::io(dir))?;
        }

        Ok(Self { raw_dir, processed_dir })
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Parse a configured format name, logging when it is not recognised.
    pub fn parse_format(name: &str) -> Result<OutputFormat, LoadError> {
        OutputFormat::try_from(name).inspect_err(|e| {
            tracing::error!(message = "unsupported output format", error = %e);
        })
    }

    /// Write the full payload to a new `weather_raw_<YYYYMMDD_HHMMSS>.json`.
    /// Only JSON is supported for raw snapshots.
    pub fn save_raw_data(
        &self,
        payload: &RawWeatherPayload,
        format: OutputFormat,
    ) -> Result<PathBuf, LoadError> {
        if format != OutputFormat::Json {
            let err = LoadError::UnsupportedFormat(format.to_string());
            tracing::error!(message = "unsupported raw output format", error = %err);
            return Err(err);
        }

        let (path, file) = create_snapshot(&self.raw_dir, "weather_raw", format)
            .inspect_err(|e| tracing::error!(message = "failed to save raw data", error = %e))?;
        tracing::info!(message = "saving raw data", path = %path.display());

        write_json(&path, file, payload)
            .inspect(|_| tracing::info!(message = "raw data saved", path = %path.display()))
            .inspect_err(|e| tracing::error!(message = "failed to save raw data", error = %e))?;

        Ok(path)
    }

    /// Write `records` to a new `weather_processed_<YYYYMMDD_HHMMSS>.<ext>` as
    /// CSV or as a JSON array of objects. An empty slice writes nothing.
    pub fn save_processed_data(
        &self,
        records: &[WeatherRecord],
        format: OutputFormat,
    ) -> Result<PathBuf, LoadError> {
        if records.is_empty() {
            tracing::warn!("no processed records, nothing to save");
            return Err(LoadError::EmptyTable);
        }

        let (path, file) = create_snapshot(&self.processed_dir, "weather_processed", format)
            .inspect_err(|e| {
                tracing::error!(message = "failed to save processed data", error = %e);
            })?;
        tracing::info!(
            message = "saving processed data",
            path = %path.display(),
            format = %format,
        );

        let written = match format {
            OutputFormat::Csv => write_records_csv(records, file).map_err(LoadError::csv(&path)),
            OutputFormat::Json => write_json(&path, file, records),
        };

        match written {
            Ok(()) => {
                tracing::info!(
                    message = "processed data saved",
                    path = %path.display(),
                    rows = records.len(),
                );
                Ok(path)
            }
            Err(e) => {
                tracing::error!(message = "failed to save processed data", error = %e);
                Err(e)
            }
        }
    }

    /// Add `records` to the end of the cumulative CSV in the processed
    /// directory, returning the total row count afterwards.
    ///
    /// The existing file is read completely and rewritten with the new rows
    /// after the old ones. This is not safe when several runs share the file.
    pub fn append_to_historical(
        &self,
        records: &[WeatherRecord],
        filename: &str,
    ) -> Result<usize, LoadError> {
        if records.is_empty() {
            tracing::warn!("no processed records, historical file left untouched");
            return Err(LoadError::EmptyTable);
        }

        let path = self.processed_dir.join(filename);
        tracing::info!(message = "appending to historical data", path = %path.display());

        match append_rows(&path, records) {
            Ok((total, created)) => {
                let message = if created {
                    "historical file created"
                } else {
                    "historical data appended"
                };
                tracing::info!(message, path = %path.display(), rows = total);
                Ok(total)
            }
            Err(e) => {
                tracing::error!(message = "failed to append to historical data", error = %e);
                Err(e)
            }
        }
    }
}

/// Create `<prefix>_<YYYYMMDD_HHMMSS>.<ext>` in `dir`, never reusing an
/// existing file. Later saves within the same second get a `_<n>` suffix.
fn create_snapshot(
    dir: &Path,
    prefix: &str,
    format: OutputFormat,
) -> Result<(PathBuf, File), LoadError> {
    let stem = format!("{prefix}_{}", Local::now().format(FILE_TIMESTAMP_FORMAT));

    for attempt in 0..MAX_SNAPSHOT_SUFFIX {
        let name = match attempt {
            0 => format!("{stem}.{}", format.extension()),
            n => format!("{stem}_{n}.{}", format.extension()),
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LoadError::io(&path)(e)),
        }
    }

    let path = dir.join(format!("{stem}.{}", format.extension()));
    Err(LoadError::io(&path)(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free snapshot name left for this second",
    )))
}

// Pretty-printed; serde_json leaves non-ASCII characters unescaped.
fn write_json<T: serde::Serialize + ?Sized>(
    path: &Path,
    file: File,
    value: &T,
) -> Result<(), LoadError> {
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, value).map_err(LoadError::json(path))?;
    out.flush().map_err(LoadError::io(path))
}

fn append_rows(path: &Path, records: &[WeatherRecord]) -> Result<(usize, bool), LoadError> {
    let created = !path.exists();
    let mut table = if created {
        HistoricalTable::new()
    } else {
        HistoricalTable::read_csv(path).map_err(LoadError::csv(path))?
    };

    table.extend(records);
    table.write_csv(path).map_err(LoadError::csv(path))?;

    Ok((table.len(), created))
}
