use anyhow::{Context, Result, bail};
use chrono::Local;
use std::{
    fs::{self, OpenOptions},
    sync::Mutex,
};
use tracing::{Level, Subscriber, subscriber::DefaultGuard};
use tracing_subscriber::{
    Layer,
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
};
use weather_etl_core::LoggingConfig;

/// Install a subscriber writing to stderr and to `<dir>/etl_<YYYYMMDD>.log`.
///
/// Events are only recorded while the returned guard is alive, and only on
/// the thread that installed it.
pub fn init(cfg: &LoggingConfig, level_override: Option<Level>) -> Result<DefaultGuard> {
    let level = match level_override {
        Some(level) => level,
        None => cfg
            .level
            .parse::<Level>()
            .with_context(|| format!("Invalid log level '{}'", cfg.level))?,
    };

    let compact = match cfg.format.to_lowercase().as_str() {
        "full" => false,
        "compact" => true,
        other => bail!("Invalid log format '{other}'. Supported formats: full, compact."),
    };

    fs::create_dir_all(&cfg.dir)
        .with_context(|| format!("Failed to create log directory: {}", cfg.dir.display()))?;

    let log_path = cfg
        .dir
        .join(format!("etl_{}.log", Local::now().format("%Y%m%d")));
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(fmt_layer(std::io::stderr, compact, true))
        .with(fmt_layer(Mutex::new(log_file), compact, false));

    Ok(tracing::subscriber::set_default(subscriber))
}

fn fmt_layer<S, W>(writer: W, compact: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    if compact {
        layer.compact().boxed()
    } else {
        layer.boxed()
    }
}
