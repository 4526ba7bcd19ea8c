//! Shared pacing, retry and backoff for calls to the generation service.
//!
//! One `ThrottledInvoker` is constructed per service endpoint and shared by
//! handle. At most one call is in flight at a time; consecutive call starts are
//! at least `min_interval` apart; retryable failures back off and publish the
//! retry window so every caller honours it.

use log::{debug, warn};
use parking_lot::Mutex;
use snaplog_config::ThrottleConfig;
use snaplog_protocol::GenerationError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};

/// Pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub min_interval: Duration,
    pub max_wait: Duration,
    pub backoff_cap: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self::from(&ThrottleConfig::default())
    }
}

impl From<&ThrottleConfig> for ThrottleSettings {
    fn from(config: &ThrottleConfig) -> Self {
        Self {
            min_interval: config.min_interval(),
            max_wait: config.max_wait(),
            backoff_cap: config.backoff_cap(),
        }
    }
}

/// Errors surfaced by a throttled call.
#[derive(Debug, Clone, Error)]
pub enum ThrottleError {
    /// The retry budget ran out; carries the most recent failure.
    #[error("retry budget exhausted after {attempts} attempts ({waited:?} waited): {last}")]
    Exhausted {
        attempts: u32,
        waited: Duration,
        last: GenerationError,
    },
    /// A non-retryable failure.
    #[error(transparent)]
    Service(GenerationError),
}

impl ThrottleError {
    /// The underlying service error.
    pub fn generation_error(&self) -> &GenerationError {
        match self {
            ThrottleError::Exhausted { last, .. } => last,
            ThrottleError::Service(err) => err,
        }
    }

    /// True when the retry budget ran out on a rate limit.
    pub fn is_rate_limit_exhaustion(&self) -> bool {
        matches!(self, ThrottleError::Exhausted { last, .. } if last.is_rate_limit())
    }
}

#[derive(Debug)]
struct ThrottleState {
    last_call_start: Option<Instant>,
    next_allowed: Option<Instant>,
    backoff: Duration,
}

/// Serializes and paces calls to one external endpoint.
#[derive(Debug)]
pub struct ThrottledInvoker {
    settings: ThrottleSettings,
    /// Bookkeeping; never held across an await.
    state: Mutex<ThrottleState>,
    /// In-flight slot, held for check, wait and call.
    in_flight: tokio::sync::Mutex<()>,
}

impl ThrottledInvoker {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(ThrottleState {
                last_call_start: None,
                next_allowed: None,
                backoff: settings.min_interval,
            }),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(ThrottleSettings::from(config))
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings
    }

    /// Start instant of the most recent attempt.
    pub fn last_call_start(&self) -> Option<Instant> {
        self.state.lock().last_call_start
    }

    /// How long a call starting at `now` would have to wait.
    pub fn required_wait(&self, now: Instant) -> Duration {
        self.state
            .lock()
            .next_allowed
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Run `call` under the throttle, retrying retryable failures until the
    /// wait budget is spent.
    pub async fn invoke<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, ThrottleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let _slot = self.in_flight.lock().await;
        let mut waited = Duration::ZERO;
        let mut attempts = 0u32;
        loop {
            let wait = self.required_wait(Instant::now());
            if !wait.is_zero() {
                debug!(
                    "throttle wait (label={label}, wait_ms={}, waited_ms={})",
                    wait.as_millis(),
                    waited.as_millis()
                );
                sleep(wait).await;
                waited += wait;
            }

            attempts += 1;
            self.mark_call_start(Instant::now());
            let err = match call().await {
                Ok(value) => {
                    self.state.lock().backoff = self.settings.min_interval;
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    debug!("non-retryable failure (label={label}, err={err})");
                    return Err(ThrottleError::Service(err));
                }
                Err(err) => err,
            };

            let delay = self.publish_retry_window(&err, Instant::now());
            if waited + delay > self.settings.max_wait {
                warn!(
                    "retry budget exhausted (label={label}, attempts={attempts}, waited_ms={}, err={err})",
                    waited.as_millis()
                );
                return Err(ThrottleError::Exhausted {
                    attempts,
                    waited,
                    last: err,
                });
            }
            warn!(
                "retrying after failure (label={label}, attempt={attempts}, delay_ms={}, err={err})",
                delay.as_millis()
            );
        }
    }

    fn mark_call_start(&self, now: Instant) {
        let mut state = self.state.lock();
        state.last_call_start = Some(now);
        state.next_allowed = Some(now + self.settings.min_interval);
    }

    /// Compute the retry delay for `err`, advance the backoff and publish the
    /// window to every caller.
    fn publish_retry_window(&self, err: &GenerationError, now: Instant) -> Duration {
        let mut state = self.state.lock();
        let delay = match retry_hint(err) {
            Some(hint) => hint.max(self.settings.min_interval),
            None => {
                let delay = state.backoff;
                state.backoff = (state.backoff * 2).min(self.settings.backoff_cap);
                delay
            }
        };
        let until = now + delay;
        state.next_allowed = Some(state.next_allowed.map_or(until, |next| next.max(until)));
        delay
    }
}

/// Retry hint carried by an error: the explicit value, else a
/// "try again in N ms|s" phrase in the message.
pub fn retry_hint(err: &GenerationError) -> Option<Duration> {
    err.retry_after()
        .or_else(|| hint_from_message(&err.to_string()))
}

fn hint_from_message(message: &str) -> Option<Duration> {
    const MARKER: &str = "try again in";
    let lower = message.to_ascii_lowercase();
    let rest = lower[lower.find(MARKER)? + MARKER.len()..].trim_start();
    let digits = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..digits].parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let unit = rest[digits..].trim_start();
    let millis = if unit.starts_with("ms") {
        value
    } else if unit.starts_with('s') {
        value * 1000.0
    } else {
        return None;
    };
    Some(Duration::from_millis(millis.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hint_parses_millis_and_seconds() {
        let rate = |message: &str| GenerationError::RateLimited {
            message: message.to_string(),
            retry_after: None,
        };
        assert_eq!(
            retry_hint(&rate("Rate limit reached. Please try again in 750ms.")),
            Some(Duration::from_millis(750))
        );
        assert_eq!(
            retry_hint(&rate("Try again in 1.5s")),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(retry_hint(&rate("try again later")), None);
        assert_eq!(retry_hint(&rate("try again in 2m")), None);
    }

    #[test]
    fn explicit_hint_wins_over_message() {
        let err = GenerationError::RateLimited {
            message: "try again in 10ms".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(retry_hint(&err), Some(Duration::from_secs(2)));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let invoker = ThrottledInvoker::new(ThrottleSettings {
            min_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(10),
            backoff_cap: Duration::from_millis(350),
        });
        let err = GenerationError::Timeout("slow".to_string());
        let now = Instant::now();
        let delays: Vec<_> = (0..4)
            .map(|_| invoker.publish_retry_window(&err, now).as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 350, 350]);
    }

    #[test]
    fn hint_is_floored_at_min_interval() {
        let invoker = ThrottledInvoker::new(ThrottleSettings {
            min_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(8),
        });
        let err = GenerationError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_millis(20)),
        };
        let now = Instant::now();
        assert_eq!(
            invoker.publish_retry_window(&err, now),
            Duration::from_millis(500)
        );
        assert_eq!(invoker.required_wait(now), Duration::from_millis(500));
    }
}
