//! Structured logging setup on top of `tracing-subscriber`.
//!
//! The planner and executor emit `tracing` events at stage boundaries (resolution summary,
//! schedule summary, pool sizing, and per-operation dispatch when
//! [`ProviderOptions::is_debug`](crate::ProviderOptions) is on). This module installs a
//! subscriber that renders them.
//!
//! Only available with the `structured-logging` feature:
//!
//! ```toml
//! [dependencies]
//! tensorplan-infer = { version = "0.1", features = ["structured-logging"] }
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use tensorplan_infer::structured_logging::{LogFormat, LogLevel, TracingLogger};
//!
//! let _logger = TracingLogger::builder()
//!     .with_format(LogFormat::Json)
//!     .with_level(LogLevel::Debug)
//!     .build()
//!     .expect("Failed to initialize logger");
//!
//! tracing::info!(ops = 12, "graph ready");
//! ```

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::{ExecutorError, ExecutorResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line, colored.
    Pretty,
    /// Single line, no colors.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for structured logging.
#[derive(Debug, Clone)]
pub struct TracingLoggerBuilder {
    format: LogFormat,
    level: LogLevel,
    env_filter: Option<String>,
    with_targets: bool,
    with_file_location: bool,
    with_span_events: bool,
}

impl Default for TracingLoggerBuilder {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: LogLevel::Info,
            env_filter: None,
            with_targets: true,
            with_file_location: false,
            with_span_events: false,
        }
    }
}

impl TracingLoggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set a custom filter directive (overrides the level).
    ///
    /// ```
    /// # use tensorplan_infer::structured_logging::TracingLoggerBuilder;
    /// let builder = TracingLoggerBuilder::new().with_env_filter("tensorplan_ir=debug,warn");
    /// ```
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Include module paths in log lines.
    pub fn with_targets(mut self, enabled: bool) -> Self {
        self.with_targets = enabled;
        self
    }

    /// Include `file:line` in log lines.
    pub fn with_file_location(mut self, enabled: bool) -> Self {
        self.with_file_location = enabled;
        self
    }

    /// Emit span enter/exit events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Install the global subscriber. Fails if one is already installed.
    pub fn build(self) -> ExecutorResult<TracingLogger> {
        let env_filter = match &self.env_filter {
            Some(custom) => EnvFilter::try_new(custom)
                .map_err(|e| ExecutorError::Logging(format!("Invalid env filter: {}", e)))?,
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        };
        let span_events = if self.with_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_target(self.with_targets)
            .with_file(self.with_file_location)
            .with_line_number(self.with_file_location)
            .with_span_events(span_events);
        match self.format {
            LogFormat::Pretty => install(env_filter, layer.pretty())?,
            LogFormat::Compact => install(env_filter, layer.with_ansi(false).compact())?,
            LogFormat::Json => install(env_filter, layer.json())?,
        }

        Ok(TracingLogger {
            format: self.format,
        })
    }
}

fn install<L>(env_filter: EnvFilter, layer: L) -> ExecutorResult<()>
where
    L: Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| ExecutorError::Logging(format!("Failed to initialize tracing: {}", e)))
}

/// Handle to an installed subscriber.
#[derive(Debug)]
pub struct TracingLogger {
    format: LogFormat,
}

impl TracingLogger {
    pub fn builder() -> TracingLoggerBuilder {
        TracingLoggerBuilder::new()
    }

    /// Pretty format, info level.
    pub fn init() -> ExecutorResult<Self> {
        Self::builder().build()
    }

    /// JSON format, info level, no targets.
    pub fn init_production() -> ExecutorResult<Self> {
        Self::builder()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Info)
            .with_targets(false)
            .build()
    }

    /// Pretty format, debug level, with file locations.
    pub fn init_development() -> ExecutorResult<Self> {
        Self::builder()
            .with_format(LogFormat::Pretty)
            .with_level(LogLevel::Debug)
            .with_file_location(true)
            .build()
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = TracingLoggerBuilder::new();
        assert_eq!(builder.format, LogFormat::Pretty);
        assert_eq!(builder.level, LogLevel::Info);
        assert!(builder.with_targets);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = TracingLoggerBuilder::new()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Trace)
            .with_targets(false)
            .with_file_location(true)
            .with_span_events(true);
        assert_eq!(builder.format, LogFormat::Compact);
        assert_eq!(builder.level.as_str(), "trace");
        assert!(!builder.with_targets);
        assert!(builder.with_file_location);
        assert!(builder.with_span_events);
    }

    #[test]
    fn test_invalid_env_filter() {
        let result = TracingLoggerBuilder::new()
            .with_env_filter("tensorplan=verbose")
            .build();
        assert!(matches!(result, Err(ExecutorError::Logging(_))));
    }
}
