//! Public SDK surface for Snaplog.
//!
//! This crate re-exports the pipeline building blocks and provides a small
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use snaplog_config as config;
pub use snaplog_core as core;
/// Re-export for convenience.
pub use snaplog_protocol as protocol;

pub use snaplog_config::SnaplogConfig;
pub use snaplog_core::{DiaryPipeline, OpenAiCompatibleProvider, SnaplogCoreError};
pub use snaplog_protocol::{DiaryOutcome, DiaryRequest, DiaryResponse};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// `RUST_LOG` controls verbosity. This is a no-op if the feature is not
/// enabled or a logger is already installed.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}
