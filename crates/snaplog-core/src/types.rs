//! Tagged stage results shared by the pipeline stages.

use crate::throttle::ThrottleError;

/// Result of a single pipeline stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The stage produced a usable value.
    Ok(T),
    /// The generation service refused the content.
    Rejected(String),
    /// The stage could not produce a value.
    Failed(StageFailure),
}

/// Why a stage failed.
#[derive(Debug)]
pub enum StageFailure {
    /// The service replied but the reply could not be used.
    Unparseable(String),
    /// The call itself failed or ran out of retries.
    Service(ThrottleError),
}
