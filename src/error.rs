//! Error types for the stress scoring pipeline.

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::keys::KeyError;
pub use crate::scheduler::SchedulerError;
pub use crate::store::StoreError;

/// Errors raised by the scoring and aggregation core.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build {name} distribution: {reason}")]
    Distribution { name: &'static str, reason: String },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
}
