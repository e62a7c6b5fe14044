use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Config file looked up relative to the working directory before falling
/// back to the platform config directory.
pub const LOCAL_CONFIG_PATH: &str = "config/config.toml";

/// Where and what to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Current-weather variables, sent comma-joined as the `current` query parameter.
    pub params: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            latitude: -23.5505,
            longitude: -46.6333,
            params: [
                "temperature_2m",
                "precipitation",
                "weather_code",
                "wind_speed_10m",
                "relative_humidity_2m",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_secs: 10,
        }
    }
}

/// Output formats and directories for the load stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub raw_format: String,
    pub processed_format: String,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub historical_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            raw_format: "json".to_string(),
            processed_format: "csv".to_string(),
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            historical_file: crate::load::DEFAULT_HISTORICAL_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    pub level: String,
    /// `full` or `compact`.
    pub format: String,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
            dir: PathBuf::from("logs"),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [api]
/// latitude = -23.5
/// longitude = -46.6
///
/// [output]
/// processed_format = "json"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from `path`, or return the defaults if it doesn't exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Resolve the config file to use: an explicit path wins, then the
    /// working-directory file, then the platform config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let local = PathBuf::from(LOCAL_CONFIG_PATH);
        if local.exists() {
            return Ok(local);
        }

        Self::platform_config_path()
    }

    /// Path to the config file in the platform config directory.
    pub fn platform_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
