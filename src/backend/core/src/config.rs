//! Configuration management for Conveyor Core.
//!
//! Layered configuration: built-in defaults, an optional config file, and
//! environment variables with the `CONVEYOR` prefix (double-underscore
//! separator, e.g. `CONVEYOR__QUEUES__EMAIL_WORKERS=8`).

use config::{Config as ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::jobs::job::JobType;
use crate::telemetry::logging::LoggingConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-Level Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Job queue configuration
    #[serde(default)]
    pub queues: QueuesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            queues: QueuesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self> {
        let config = ConfigBuilder::builder()
            .add_source(
                Environment::with_prefix("CONVEYOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a file plus environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = ConfigBuilder::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CONVEYOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Worker pool sizing for the per-type job queues.
///
/// Each job type gets an independent pool so a backlog in one type never
/// starves another. Cheap fan-out work (cache warming) runs wider than
/// rate-limited work (AI providers).
#[derive(Debug, Clone, Deserialize)]
pub struct QueuesConfig {
    /// Workers for bulk catalog imports
    #[serde(default = "default_bulk_import_workers")]
    pub bulk_import_workers: usize,

    /// Workers for AI content generation (provider rate limits apply)
    #[serde(default = "default_ai_content_workers")]
    pub ai_content_workers: usize,

    /// Workers for cache warming
    #[serde(default = "default_cache_warm_workers")]
    pub cache_warm_workers: usize,

    /// Workers for transactional email
    #[serde(default = "default_email_workers")]
    pub email_workers: usize,

    /// Workers for AI batch processing
    #[serde(default = "default_ai_batch_workers")]
    pub ai_batch_workers: usize,

    /// Workers for database batch inserts
    #[serde(default = "default_db_batch_workers")]
    pub db_batch_workers: usize,
}

fn default_bulk_import_workers() -> usize {
    2
}

fn default_ai_content_workers() -> usize {
    2
}

fn default_cache_warm_workers() -> usize {
    8
}

fn default_email_workers() -> usize {
    4
}

fn default_ai_batch_workers() -> usize {
    1
}

fn default_db_batch_workers() -> usize {
    2
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            bulk_import_workers: default_bulk_import_workers(),
            ai_content_workers: default_ai_content_workers(),
            cache_warm_workers: default_cache_warm_workers(),
            email_workers: default_email_workers(),
            ai_batch_workers: default_ai_batch_workers(),
            db_batch_workers: default_db_batch_workers(),
        }
    }
}

impl QueuesConfig {
    /// Worker pool size for a job type. Always at least 1.
    pub fn workers_for(&self, job_type: JobType) -> usize {
        let configured = match job_type {
            JobType::BulkImport => self.bulk_import_workers,
            JobType::AiContentGeneration => self.ai_content_workers,
            JobType::CacheWarm => self.cache_warm_workers,
            JobType::EmailSend => self.email_workers,
            JobType::AiBatchProcessing => self.ai_batch_workers,
            JobType::DbBatchInsert => self.db_batch_workers,
        };
        configured.max(1)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.queues.cache_warm_workers, 8);
        assert_eq!(config.queues.ai_batch_workers, 1);
    }

    #[test]
    fn test_workers_for_covers_every_type() {
        let config = QueuesConfig::default();
        for job_type in JobType::ALL {
            assert!(config.workers_for(job_type) >= 1);
        }
    }

    #[test]
    fn test_workers_for_floors_at_one() {
        let config = QueuesConfig {
            email_workers: 0,
            ..QueuesConfig::default()
        };
        assert_eq!(config.workers_for(JobType::EmailSend), 1);
    }

    #[test]
    fn test_cache_warm_wider_than_ai() {
        let config = QueuesConfig::default();
        assert!(
            config.workers_for(JobType::CacheWarm)
                > config.workers_for(JobType::AiContentGeneration)
        );
    }
}
