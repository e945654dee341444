//! Error handling for Conveyor Core.
//!
//! This module provides:
//! - Machine-readable error codes with stable numeric values
//! - HTTP status code mapping for API responses
//! - Severity levels that drive logging and alerting
//! - Error chaining with user-facing vs internal messages
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use conveyor_core::error::{ConveyorError, ErrorContext, Result};
//!
//! fn my_function() -> Result<()> {
//!     some_operation().context("Failed to perform operation")?;
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::jobs::job::{JobId, JobType};

/// A specialized Result type for Conveyor operations.
pub type Result<T> = std::result::Result<T, ConveyorError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Job Errors (1000-1099)
    JobNotFound,
    JobAlreadyFinished,
    JobCancelled,
    HandlerFailed,
    HandlerPanicked,

    // Queue Errors (1100-1199)
    QueueUnavailable,
    QueueShuttingDown,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // Validation Errors (4100-4199)
    ValidationError,
    UnknownJobType,
    InvalidStatusFilter,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,
    MissingHandler,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            // Job Errors
            Self::JobNotFound => 1000,
            Self::JobAlreadyFinished => 1001,
            Self::JobCancelled => 1002,
            Self::HandlerFailed => 1003,
            Self::HandlerPanicked => 1004,

            // Queue Errors
            Self::QueueUnavailable => 1100,
            Self::QueueShuttingDown => 1101,

            // Serialization Errors
            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            // Validation Errors
            Self::ValidationError => 4100,
            Self::UnknownJobType => 4101,
            Self::InvalidStatusFilter => 4102,

            // Configuration Errors
            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,
            Self::MissingHandler => 5003,

            // Internal Errors
            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            // Not Found (404)
            Self::JobNotFound => StatusCode::NOT_FOUND,

            // Conflict (409)
            Self::JobAlreadyFinished | Self::JobCancelled => StatusCode::CONFLICT,

            // Bad Request (400)
            Self::UnknownJobType => StatusCode::BAD_REQUEST,

            // Unprocessable Entity (422)
            Self::ValidationError | Self::InvalidStatusFilter => StatusCode::UNPROCESSABLE_ENTITY,

            // Service Unavailable (503)
            Self::QueueUnavailable | Self::QueueShuttingDown => StatusCode::SERVICE_UNAVAILABLE,

            // Internal Server Error (500)
            Self::HandlerFailed
            | Self::HandlerPanicked
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::MissingHandler
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable by the caller.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueUnavailable | Self::QueueShuttingDown)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "job",
            1100..=1199 => "queue",
            2200..=2299 => "serialization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, lookups that miss)
    Low,
    /// Errors scoped to a single job (handler failures)
    Medium,
    /// System errors (serialization, configuration)
    High,
    /// Errors that risk stalling a whole queue
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::JobNotFound
            | ErrorCode::JobAlreadyFinished
            | ErrorCode::JobCancelled
            | ErrorCode::ValidationError
            | ErrorCode::UnknownJobType
            | ErrorCode::InvalidStatusFilter => Self::Low,

            ErrorCode::HandlerFailed | ErrorCode::HandlerPanicked => Self::Medium,

            ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration
            | ErrorCode::MissingHandler => Self::High,

            ErrorCode::QueueUnavailable
            | ErrorCode::QueueShuttingDown
            | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Conveyor Core.
///
/// Supports structured error codes, error chaining, user-friendly vs internal
/// messages, HTTP status mapping, and metrics integration.
#[derive(Error, Debug)]
pub struct ConveyorError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for ConveyorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ConveyorError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create an unknown job type error.
    pub fn unknown_job_type(raw: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UnknownJobType,
            format!("Unknown job type: {}", raw.into()),
        )
    }

    /// Create a job not found error.
    pub fn job_not_found(job_type: JobType, id: JobId) -> Self {
        Self::new(
            ErrorCode::JobNotFound,
            format!("Job not found: {} ({})", id, job_type),
        )
    }

    /// Create an error for cancelling a job that already reached a terminal status.
    pub fn job_already_finished(id: JobId) -> Self {
        Self::new(
            ErrorCode::JobAlreadyFinished,
            format!("Job already finished: {}", id),
        )
    }

    /// Create the distinguished cancellation acknowledgment error.
    ///
    /// Handlers return this from a safe checkpoint after observing the
    /// cancellation token; the dispatcher then records the job as cancelled
    /// instead of failed.
    pub fn job_cancelled(id: JobId) -> Self {
        Self::new(ErrorCode::JobCancelled, format!("Job cancelled: {}", id))
    }

    /// Create a missing handler error.
    pub fn missing_handler(job_type: JobType) -> Self {
        Self::new(
            ErrorCode::MissingHandler,
            format!("No handler registered for job type: {}", job_type),
        )
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "conveyor_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&ConveyorError> for ErrorResponse {
    fn from(error: &ConveyorError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for ConveyorError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ConveyorError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| ConveyorError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ConveyorError::new(ErrorCode::JobNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| ConveyorError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for ConveyorError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for ConveyorError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An I/O error occurred",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for ConveyorError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::FileParse { .. } | config::ConfigError::PathParse(_) => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

impl From<anyhow::Error> for ConveyorError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ConveyorError>() {
            Ok(conveyor_error) => conveyor_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::JobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::JobAlreadyFinished.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::UnknownJobType.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::ValidationError.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::QueueUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::QueueUnavailable.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::JobNotFound.is_retryable());
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::UnknownJobType),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::HandlerFailed),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::MissingHandler),
            ErrorSeverity::High
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::QueueUnavailable),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_error_display() {
        let error = ConveyorError::with_internal(
            ErrorCode::QueueUnavailable,
            "Queue backend unavailable",
            "dispatcher task exited unexpectedly",
        );

        let display = format!("{}", error);
        assert!(display.contains("QueueUnavailable"));
        assert!(display.contains("Queue backend unavailable"));
        assert!(display.contains("dispatcher task exited"));
    }

    #[test]
    fn test_error_context_on_option() {
        let missing: Option<u32> = None;
        let err = missing.context("job vanished").unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobNotFound);

        let present = Some(7).context("job vanished");
        assert_eq!(present.unwrap(), 7);
    }

    #[test]
    fn test_error_context_on_result() {
        let failing: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "broken"));
        let err = failing
            .with_error_code(ErrorCode::QueueUnavailable)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::QueueUnavailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ConveyorError::unknown_job_type("video-transcode");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("UNKNOWN_JOB_TYPE"));
        assert!(json.contains("video-transcode"));
        assert!(json.contains("\"numericCode\":4101"));
    }
}
