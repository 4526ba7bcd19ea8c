//! Error types for the core pipeline crate.

use snaplog_config::ConfigError;
use snaplog_protocol::GenerationError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned to callers of the diary pipeline.
#[derive(Debug, Error)]
pub enum SnaplogCoreError {
    /// Neither photos nor usable summary lines were supplied.
    #[error("empty batch: provide at least one photo or summary line")]
    EmptyBatch,
    /// A photo payload could not be used.
    #[error("invalid image at index {index}: {reason}")]
    InvalidImage { index: usize, reason: String },
    /// The generation service kept rate limiting until the wait budget ran out.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Suggested delay before the caller retries.
        retry_after: Option<Duration>,
    },
    /// Generation service error outside the throttled pipeline.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// A built-in text pattern failed to compile.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Parsing error.
    #[error("parse error: {0}")]
    Parse(String),
}
