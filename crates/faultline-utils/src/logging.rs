//! # Logging Utilities
//!
//! `tracing` subscriber setup for the faultline binaries.
//!
//! Console output goes to **stderr**, the same stream crash reports use, so a
//! program's stdout stays clean. An optional file layer writes through a
//! non-blocking, daily-rolling appender.
//!
//! Nothing here is touched from the signal handler: faultline's fault path
//! writes with raw `write(2)` and never emits `tracing` events.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=faultline_core=debug`)
//! - `FAULTLINE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `FAULTLINE_LOG_FILE`: path of an additional log file, or `auto` for
//!   `~/.faultline/YYYY-MM-DD-faultline.log`
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_utils::{init_logging_with_level, LogFormat, LogLevel};
//!
//! // Keep the guard alive for as long as file logging should flush.
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
//!     .expect("Failed to initialize logging");
//! tracing::debug!("ready");
//! ```

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output format variable.
pub const ENV_LOG_FORMAT: &str = "FAULTLINE_LOG_FORMAT";

/// Log file variable.
pub const ENV_LOG_FILE: &str = "FAULTLINE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "dev" | "text" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Keeps the file writer's background thread alive
///
/// Dropping it flushes and stops file logging. Console logging is unaffected.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// `RUST_LOG` selects the filter (default `info`), `FAULTLINE_LOG_FORMAT` the
/// format and `FAULTLINE_LOG_FILE` an optional log file.
///
/// ## Errors
///
/// Returns an error if:
/// - A subscriber is already installed
/// - `FAULTLINE_LOG_FORMAT` holds an unknown format
/// - The log file directory cannot be created
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    let format = match env::var(ENV_LOG_FORMAT) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    init(format, filter, log_file_from_env()?)
}

/// Initialize logging with an explicit level and format
///
/// The level overrides `RUST_LOG`. `FAULTLINE_LOG_FILE` is still honored.
///
/// ## Errors
///
/// Same as [`init_logging`], minus the format check.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LogGuard, LoggingError>
{
    init(format, EnvFilter::new(Level::from(level).to_string()), log_file_from_env()?)
}

/// Dated log file under `~/.faultline`, or the temp dir without `HOME`.
///
/// ## Errors
///
/// [`LoggingError::FileError`] if the directory cannot be created.
pub fn default_log_file() -> Result<PathBuf, LoggingError>
{
    let today = Utc::now().format("%Y-%m-%d");
    let dir = env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".faultline"))
        .unwrap_or_else(env::temp_dir);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!("{today}-faultline.log")))
}

fn log_file_from_env() -> Result<Option<PathBuf>, LoggingError>
{
    match env::var(ENV_LOG_FILE) {
        Ok(value) if value.eq_ignore_ascii_case("auto") => default_log_file().map(Some),
        Ok(value) if !value.trim().is_empty() => Ok(Some(PathBuf::from(value))),
        _ => Ok(None),
    }
}

fn init(format: LogFormat, filter: EnvFilter, log_file: Option<PathBuf>) -> Result<LogGuard, LoggingError>
{
    let mut layers = vec![console_layer(format)];
    let mut guard = None;

    if let Some(path) = log_file {
        let (layer, file_guard) = file_layer(format, &path)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LogGuard { _file: guard })
}

fn console_layer(format: LogFormat) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);

    match format {
        LogFormat::Pretty => layer.with_ansi(io::stderr().is_terminal()).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn file_layer(format: LogFormat, path: &Path) -> Result<(BoxedLayer, WorkerGuard), LoggingError>
{
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false);

    let layer = match format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    };
    Ok((layer, guard))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// Log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
