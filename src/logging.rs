//! Structured logging and tracing for Helios
//!
//! This module provides logging setup with support for structured logging,
//! daily log rotation, and integration with the tracing ecosystem.

use crate::config::LoggingConfig;
use crate::error::{HeliosError, Result};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, Subscriber, debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Dropping the guard stops the file writer thread
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Install the global subscriber; later calls return the first outcome
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let base_level = parse_log_level(&config.level)?;
            // Unparseable per-output levels fall back to the base level
            let or_base = |level: &Option<String>| {
                level
                    .as_deref()
                    .and_then(|s| parse_log_level(s).ok())
                    .unwrap_or(base_level)
            };
            let console_level = or_base(&config.console_level);
            let file_level = or_base(&config.file_level);

            let filter = build_env_filter(min_level(console_level, file_level));

            if should_use_console_only() {
                init_console_only_logging(filter, config.json_format, console_level);
                return Ok(());
            }

            init_file_logging(config, filter, console_level, file_level)
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(HeliosError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("helios={},reqwest=warn", level).into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("HELIOS_DISABLE_FILE_LOG").is_some()
}

/// Formatting layer shared by console and file output
fn output_layer<S, W>(writer: W, json: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    let filter = LevelFilter::from_level(level);
    if json {
        base.json().with_filter(filter).boxed()
    } else {
        base.with_filter(filter).boxed()
    }
}

fn init_console_only_logging(filter: EnvFilter, json_format: bool, console_level: Level) {
    // A test harness may already have installed a subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(std::io::stdout, json_format, console_level))
        .try_init();

    info!(?console_level, "Logging initialized, console only");
}

/// Directory for rotated files; a configured path with an extension names a
/// file whose parent directory is used
fn log_directory(file: &str) -> &Path {
    let path = Path::new(file);
    match path.parent() {
        Some(parent) if path.extension().is_some() => parent,
        _ => path,
    }
}

fn init_file_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    console_level: Level,
    file_level: Level,
) -> Result<()> {
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("helios")
        .filename_suffix("log")
        .max_log_files(config.backup_count as usize)
        .build(log_directory(&config.file))
        .map_err(|e| HeliosError::io(format!("Failed to create log file appender: {}", e)))?;

    let (writer, guard) = non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let console = config
        .console_output
        .then(|| output_layer(std::io::stdout, config.json_format, console_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(writer, config.json_format, file_level))
        .with(console)
        .try_init()
        .map_err(|e| HeliosError::config(e.to_string()))?;

    info!(
        ?console_level,
        ?file_level,
        file = %config.file,
        "Logging initialized"
    );
    Ok(())
}

/// Level named in the config; `warning` is accepted as an alias of `warn`
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_ascii_lowercase().as_str() {
        "warning" => Ok(Level::WARN),
        other => other
            .parse()
            .map_err(|_| HeliosError::config(format!("Invalid log level: {}", level_str))),
    }
}

/// The more verbose of two levels
fn min_level(a: Level, b: Level) -> Level {
    // tracing orders TRACE above ERROR
    a.max(b)
}

/// Fields attached to every line a [`StructuredLogger`] writes
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Subsystem, e.g. "driver" or "vehicle"
    pub component: String,
    /// Vehicle id or inverter host
    pub device: Option<String>,
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_owned(),
            device: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_device(self, device: &str) -> Self {
        Self {
            device: Some(device.to_owned()),
            ..self
        }
    }

    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_owned(), value);
        self
    }
}

impl std::fmt::Display for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component={}", self.component)?;
        if let Some(device) = &self.device {
            write!(f, ",device={}", device)?;
        }
        for (key, value) in &self.extra_fields {
            write!(f, ",{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Logger that prefixes each event with its [`LogContext`]
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn info(&self, message: &str) {
        info!(fields = %self.context, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(fields = %self.context, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        debug!(fields = %self.context, "{}", message);
    }
}

/// Logger tagged with just a component name
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
