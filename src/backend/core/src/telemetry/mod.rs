//! Telemetry infrastructure: structured logging setup.
//!
//! Metrics are emitted through the `metrics` facade at transition points;
//! wiring an exporter is the host application's concern.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
