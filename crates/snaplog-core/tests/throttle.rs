//! Throttle pacing and retry behaviour under paused time.

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use snaplog_core::{ThrottleError, ThrottleSettings, ThrottledGenerator, ThrottledInvoker};
use snaplog_protocol::{
    GenerationError, GenerationPurpose, GenerationRequest, GenerationService, ResponseFormat,
};
use snaplog_test_utils::{FailingGenerator, ScriptedGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn settings(min_interval_ms: u64, max_wait_ms: u64) -> ThrottleSettings {
    ThrottleSettings {
        min_interval: Duration::from_millis(min_interval_ms),
        max_wait: Duration::from_millis(max_wait_ms),
        backoff_cap: Duration::from_millis(min_interval_ms * 16),
    }
}

fn request() -> GenerationRequest {
    GenerationRequest {
        purpose: GenerationPurpose::Draft,
        model: "text-model".to_string(),
        system: "system".to_string(),
        prompt: "prompt".to_string(),
        images: Vec::new(),
        temperature: 0.15,
        top_p: None,
        max_tokens: 600,
        response_format: ResponseFormat::Text,
    }
}

fn rate_limited(retry_after_ms: u64) -> GenerationError {
    GenerationError::RateLimited {
        message: "Rate limit reached".to_string(),
        retry_after: Some(Duration::from_millis(retry_after_ms)),
    }
}

/// An explicit retry hint delays the next attempt by at least the hint.
#[tokio::test(start_paused = true)]
async fn explicit_hint_delays_next_attempt() {
    let generator = ScriptedGenerator::new()
        .then_err(GenerationPurpose::Draft, rate_limited(2000))
        .then_ok(GenerationPurpose::Draft, "done");
    let service: Arc<dyn GenerationService> = Arc::new(generator.clone());
    let throttled = ThrottledGenerator::new(
        service,
        Arc::new(ThrottledInvoker::new(settings(500, 30_000))),
    );

    let (reply, attempt) = throttled.generate(request()).await.expect("reply");
    assert_eq!(reply.content, "done");
    assert_eq!(attempt.output, "done");

    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].at.duration_since(calls[0].at) >= Duration::from_millis(2000));
}

/// The wait budget is never exceeded and the last error is surfaced.
#[tokio::test(start_paused = true)]
async fn exhaustion_surfaces_last_error_within_budget() {
    let failing = FailingGenerator::new(rate_limited(10_000));
    let throttled = ThrottledGenerator::new(
        Arc::new(failing.clone()),
        Arc::new(ThrottledInvoker::new(settings(500, 25_000))),
    );

    let err = throttled.generate(request()).await.expect_err("exhausted");
    let attempts = failing.attempts();
    assert_eq!(attempts.len(), 3);
    let elapsed = attempts[2].duration_since(attempts[0]);
    assert!(elapsed <= Duration::from_millis(25_000));
    assert!(err.is_rate_limit_exhaustion());
    match err {
        ThrottleError::Exhausted {
            attempts,
            waited,
            last,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(waited, Duration::from_secs(20));
            assert_eq!(last, rate_limited(10_000));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

/// Without a hint the delay starts at the minimum interval and doubles.
#[tokio::test(start_paused = true)]
async fn backoff_doubles_between_attempts() {
    let timeout = || GenerationError::Timeout("upstream slow".to_string());
    let generator = ScriptedGenerator::new()
        .then_err(GenerationPurpose::Draft, timeout())
        .then_err(GenerationPurpose::Draft, timeout())
        .then_err(GenerationPurpose::Draft, timeout())
        .then_ok(GenerationPurpose::Draft, "finally");
    let throttled = ThrottledGenerator::new(
        Arc::new(generator.clone()),
        Arc::new(ThrottledInvoker::new(settings(500, 30_000))),
    );

    throttled.generate(request()).await.expect("reply");
    let starts: Vec<Instant> = generator.calls().iter().map(|call| call.at).collect();
    let gaps: Vec<u128> = starts
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]).as_millis())
        .collect();
    assert_eq!(gaps, vec![500, 1000, 2000]);
}

/// Non-retryable errors propagate after a single attempt.
#[tokio::test(start_paused = true)]
async fn non_retryable_errors_propagate_immediately() {
    let failing = FailingGenerator::new(GenerationError::ContentPolicy("refused".to_string()));
    let throttled = ThrottledGenerator::new(
        Arc::new(failing.clone()),
        Arc::new(ThrottledInvoker::new(settings(500, 30_000))),
    );

    let err = throttled.generate(request()).await.expect_err("refused");
    assert_eq!(failing.attempts().len(), 1);
    assert!(matches!(
        err,
        ThrottleError::Service(GenerationError::ContentPolicy(_))
    ));
}

/// Concurrent callers sharing one invoker start at least one interval apart.
#[tokio::test(start_paused = true)]
async fn concurrent_callers_are_serialized_and_paced() {
    let invoker = Arc::new(ThrottledInvoker::new(settings(500, 30_000)));
    let starts = Arc::new(Mutex::new(Vec::new()));
    let call = |label: &'static str| {
        let invoker = invoker.clone();
        let starts = starts.clone();
        async move {
            invoker
                .invoke(label, || {
                    let starts = starts.clone();
                    async move {
                        starts.lock().push(Instant::now());
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, GenerationError>(label)
                    }
                })
                .await
        }
    };

    let (first, second, third) = tokio::join!(call("a"), call("b"), call("c"));
    assert!(first.is_ok() && second.is_ok() && third.is_ok());

    let mut starts = starts.lock().clone();
    starts.sort();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(500));
    }
}

/// A retry window published by one caller also delays the next caller.
#[tokio::test(start_paused = true)]
async fn retry_window_is_shared_between_callers() {
    let invoker = Arc::new(ThrottledInvoker::new(settings(100, 2_000)));
    let failing = FailingGenerator::new(rate_limited(1_500));

    let started = Instant::now();
    let err = invoker
        .invoke("first", || failing.generate(request()))
        .await
        .expect_err("exhausted");
    assert!(err.is_rate_limit_exhaustion());

    let waited_before = invoker.required_wait(Instant::now());
    assert!(waited_before > Duration::ZERO);
    invoker
        .invoke("second", || async { Ok::<_, GenerationError>(()) })
        .await
        .expect("second call");
    assert!(Instant::now().duration_since(started) >= Duration::from_millis(3_000));
}
