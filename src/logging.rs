//! Logging setup and the structured logger used across the crate.
//!
//! Initialization wires tracing with an env-filter, an optional JSON format,
//! a rolling daily log file and a console writer. Modules obtain a
//! [`StructuredLogger`] through [`get_logger`] and attach message context
//! (system id, refresh generation) through [`LogContext`].

use crate::config::LoggingConfig;
use crate::error::{HyperionError, Result};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// The non-blocking worker guard must outlive every log call
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Initialize the tracing subscriber from configuration.
///
/// Only the first call takes effect; later calls return the outcome of the
/// first one, so library consumers and tests may call it freely.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = try_init(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    match INIT_ERROR.get() {
        Some(err) => Err(HyperionError::config(err.clone())),
        None => Ok(()),
    }
}

fn try_init(config: &LoggingConfig) -> Result<()> {
    let base_level = parse_log_level(&config.level)?;
    let console_level = override_level(config.console_level.as_deref(), base_level);
    let file_level = override_level(config.file_level.as_deref(), base_level);

    let filter = build_env_filter(min_level(console_level, file_level));
    let registry = tracing_subscriber::registry().with(filter);

    // Tests and HYPERION_DISABLE_FILE_LOG skip the file appender entirely
    if cfg!(test) || std::env::var_os("HYPERION_DISABLE_FILE_LOG").is_some() {
        registry
            .with(fmt_layer(std::io::stdout, config.json_format, console_level))
            .init();
        info!("Logging initialized, console only, level {:?}", console_level);
        return Ok(());
    }

    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("hyperion")
        .filename_suffix("log")
        .max_log_files(config.backup_count as usize)
        .build(log_dir(&config.file))
        .map_err(|e| HyperionError::io(format!("Failed to create log file appender: {}", e)))?;
    let (writer, guard) = non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let with_file = registry.with(fmt_layer(writer, config.json_format, file_level));
    if config.console_output {
        with_file
            .with(fmt_layer(std::io::stdout, config.json_format, console_level))
            .init();
    } else {
        with_file.init();
    }

    info!(
        "Logging initialized, console {:?}, file {:?} at {}",
        console_level, file_level, config.file
    );
    Ok(())
}

fn override_level(configured: Option<&str>, base: Level) -> Level {
    configured
        .and_then(|s| parse_log_level(s).ok())
        .unwrap_or(base)
}

/// One fmt layer, boxed so the file and console variants compose uniformly.
fn fmt_layer<S, W>(writer: W, json: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    if json {
        base.json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        base.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

/// Directory the rolling appender writes into. A configured path with an
/// extension is taken as a file inside the log directory.
fn log_dir(configured: &str) -> &Path {
    let p = Path::new(configured);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hyperion={},reqwest=warn,hyper=warn", level).into())
}

fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        _ => Err(HyperionError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}

fn level_rank(level: Level) -> u8 {
    match level {
        Level::TRACE => 0,
        Level::DEBUG => 1,
        Level::INFO => 2,
        Level::WARN => 3,
        Level::ERROR => 4,
    }
}

fn min_level(a: Level, b: Level) -> Level {
    if level_rank(a) <= level_rank(b) { a } else { b }
}

/// Context fields rendered into every message from one logger.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    component: String,
    system_id: Option<String>,
    generation: Option<u64>,
    extra: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            ..Self::default()
        }
    }

    /// Scope the context to one PV system
    pub fn system(mut self, system_id: &str) -> Self {
        self.system_id = Some(system_id.to_string());
        self
    }

    /// Tag messages with the refresh generation that produced them
    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attach an arbitrary key=value pair
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn into_logger(self) -> StructuredLogger {
        StructuredLogger { context: self }
    }

    fn render(&self) -> String {
        let mut parts = vec![format!("component={}", self.component)];
        if let Some(id) = &self.system_id {
            parts.push(format!("system_id={}", id));
        }
        if let Some(generation) = self.generation {
            parts.push(format!("generation={}", generation));
        }
        parts.extend(self.extra.iter().map(|(k, v)| format!("{}={}", k, v)));
        parts.join(",")
    }
}

/// Logger handle carrying fixed context fields.
#[derive(Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Derived logger scoped to one system; the base context is kept
    pub fn for_system(&self, system_id: &str) -> Self {
        self.context.clone().system(system_id).into_logger()
    }

    /// Derived logger tagged with a refresh generation
    pub fn for_generation(&self, generation: u64) -> Self {
        self.context.clone().generation(generation).into_logger()
    }

    pub fn debug(&self, message: &str) {
        debug!(fields = %self.context.render(), "{}", message);
    }

    pub fn info(&self, message: &str) {
        info!(fields = %self.context.render(), "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(fields = %self.context.render(), "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(fields = %self.context.render(), "{}", message);
    }
}

/// Component-scoped logger, the usual entry point.
pub fn get_logger(component: &str) -> StructuredLogger {
    LogContext::new(component).into_logger()
}
