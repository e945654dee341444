#![allow(clippy::result_large_err)]
//! # Conveyor Core
//!
//! Background job processing for the Conveyor commerce platform.
//!
//! ## Architecture
//!
//! - **Jobs**: Multi-type priority queues with bounded per-type worker pools
//! - **Lifecycle**: Cancel, pause, resume, and clean operations per queue
//! - **API**: Mountable HTTP router exposing submission, status, and control
//! - **Telemetry**: Structured logging and metrics at every transition
//!
//! The crate is a library: the host application registers handlers, mounts
//! the router under its own auth, and owns the listener.
//!
//! ```rust,ignore
//! use conveyor_core::prelude::*;
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register(JobType::EmailSend, EmailHandler::new(mailer));
//!
//! let registry = QueueRegistry::new(&config.queues, handlers);
//! registry.start();
//!
//! let router = conveyor_core::api::job_routes(registry.clone());
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use error::{ConveyorError, ErrorCode, ErrorContext, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, QueuesConfig};
    pub use crate::error::{ConveyorError, ErrorCode, ErrorContext, ErrorSeverity, Result};
    pub use crate::jobs::{
        CancelOutcome, CleanOptions, EnqueueOptions, HandlerRegistry, Job, JobContext, JobHandler,
        JobId, JobPriority, JobStatus, JobType, QueueRegistry, QueueStats,
    };
    pub use crate::telemetry::{init_logging, LoggingConfig};
}
