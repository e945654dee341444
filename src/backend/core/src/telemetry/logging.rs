//! Structured Logging with JSON/Pretty Formats.
//!
//! This module provides the logging infrastructure with:
//!
//! - JSON format for production environments
//! - Pretty format for development
//! - Per-module log level configuration
//! - Span event configuration
//!
//! Job payloads are opaque to the core and are never logged.

use serde::Deserialize;
use std::collections::HashMap;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_include_location")]
    pub include_location: bool,

    /// Whether to include thread information
    #[serde(default)]
    pub include_thread: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Span event configuration
    #[serde(default)]
    pub span_events: SpanEventConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: default_include_location(),
            include_thread: false,
            include_target: default_include_target(),
            span_events: SpanEventConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Configuration for span event logging.
#[derive(Debug, Clone, Deserialize)]
pub struct SpanEventConfig {
    /// Log when spans are created
    #[serde(default)]
    pub on_new: bool,

    /// Log when spans are entered
    #[serde(default)]
    pub on_enter: bool,

    /// Log when spans are exited
    #[serde(default)]
    pub on_exit: bool,

    /// Log when spans are closed
    #[serde(default = "default_on_close")]
    pub on_close: bool,
}

impl Default for SpanEventConfig {
    fn default() -> Self {
        Self {
            on_new: false,
            on_enter: false,
            on_exit: false,
            on_close: default_on_close(),
        }
    }
}

impl SpanEventConfig {
    fn to_fmt_span(&self) -> FmtSpan {
        let mut span = FmtSpan::NONE;
        if self.on_new {
            span |= FmtSpan::NEW;
        }
        if self.on_enter {
            span |= FmtSpan::ENTER;
        }
        if self.on_exit {
            span |= FmtSpan::EXIT;
        }
        if self.on_close {
            span |= FmtSpan::CLOSE;
        }
        span
    }
}

// Default value functions
fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_location() -> bool {
    true
}

fn default_include_target() -> bool {
    true
}

fn default_on_close() -> bool {
    true
}

/// Initialize the logging subsystem.
///
/// This function sets up the tracing subscriber with the appropriate format
/// and filters based on the configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration
/// * `environment` - Current environment (development/production)
///
/// # Errors
///
/// Returns an error if the subscriber cannot be initialized.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    // Build the environment filter
    let mut filter = EnvFilter::try_new(&config.level)?;

    // Add per-module filters
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(directive.parse()?);
    }

    // Determine format based on environment if not explicitly set
    let format = if environment == "development" && config.format == LogFormat::Json {
        // In development, prefer pretty format unless explicitly set
        &LogFormat::Pretty
    } else {
        &config.format
    };

    // Build the subscriber based on format
    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(config.span_events.to_fmt_span())
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_span_events(config.span_events.to_fmt_span())
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_span_events(config.span_events.to_fmt_span())
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
