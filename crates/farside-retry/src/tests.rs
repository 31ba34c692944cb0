//! Tests for retry schedules and configuration.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::ConfigError;
use crate::RetryConfig;
use crate::RetryError;
use crate::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
struct Flaky(u32);

impl std::fmt::Display for Flaky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flaky failure #{}", self.0)
    }
}

// ============================================================================
//  FIXED SCHEDULE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fixed_always_failing_stops_after_budget() {
    let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = policy
        .retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(Flaky(n)) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(result, Err(RetryError::Exhausted { attempts: 4, last: Flaky(4) }));
}

#[tokio::test(start_paused = true)]
async fn test_fixed_succeeds_on_last_permitted_attempt() {
    let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
    let calls = AtomicU32::new(0);

    let result = policy
        .retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 4 {
                    Err(Flaky(n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    assert_eq!(result, Ok(4));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_success_is_never_retried() {
    let policy = RetryPolicy::fixed(5, Duration::from_secs(1));
    let calls = AtomicU32::new(0);

    let result: Result<&str, RetryError<Flaky>> = policy
        .retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("done") }
        })
        .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_sleeps_jittered_delay_between_attempts() {
    let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
    let start = tokio::time::Instant::now();

    let _: Result<(), _> = policy.retry(|| async { Err(Flaky(0)) }).await;

    // three waits, each in [0.5s, 1.5s)
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(1500), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(4500), "elapsed {:?}", elapsed);
}

#[test]
fn test_fixed_delay_stays_within_jitter_band() {
    let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
    let mut backoff = policy.backoff();

    for _ in 0..100 {
        let delay = backoff.next_delay(crate::jitter());
        assert!(delay >= Duration::from_secs(1));
        assert!(delay < Duration::from_secs(3));
    }
}

// ============================================================================
//  EXPONENTIAL SCHEDULE
// ============================================================================

#[test]
fn test_exponential_delays_are_monotone_and_capped() {
    let policy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(4));
    let max = Duration::from_secs(4);

    for _ in 0..200 {
        let mut backoff = policy.backoff();
        let mut previous = Duration::ZERO;

        for _ in 0..policy.max_attempts() {
            let delay = backoff.next_delay(crate::jitter());
            assert!(delay <= max, "delay {:?} above cap", delay);
            assert!(delay >= previous, "delay {:?} dropped below {:?}", delay, previous);
            previous = delay;
        }
    }
}

#[test]
fn test_exponential_schedule_with_fixed_jitter() {
    let policy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(4));
    let mut backoff = policy.backoff();

    let delays: Vec<_> = (0..5).map(|_| backoff.next_delay(1.0)).collect();

    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(4),
            Duration::from_secs(4),
        ]
    );
}

#[test]
fn test_exponential_jitter_applies_before_cap() {
    let policy = RetryPolicy::exponential(3, Duration::from_secs(3), Duration::from_secs(4));
    let mut backoff = policy.backoff();

    // 3s * 1.4 = 4.2s, capped to 4s; next round starts from 8s
    assert_eq!(backoff.next_delay(1.4), Duration::from_secs(4));
    assert_eq!(backoff.next_delay(0.5), Duration::from_secs(4));
}

#[test]
fn test_backoff_is_private_to_each_loop() {
    let policy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(60));

    let mut first = policy.backoff();
    first.next_delay(1.0);
    first.next_delay(1.0);

    let mut second = policy.backoff();
    assert_eq!(second.next_delay(1.0), Duration::from_secs(1));
}

// ============================================================================
//  CONDITIONAL RETRY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_if_aborts_on_permanent_failure() {
    let policy = RetryPolicy::fixed(10, Duration::from_secs(1));
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = policy
        .retry_if(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(Flaky(n)) }
            },
            |err| err.0 < 2,
        )
        .await;

    assert_eq!(result, Err(RetryError::Aborted(Flaky(2))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_retry_error_display_wraps_last_failure() {
    let err = RetryError::Exhausted { attempts: 4, last: Flaky(4) };
    assert_eq!(err.to_string(), "Retries exhausted after 4 attempts: flaky failure #4");
    assert!(err.is_exhausted());
    assert_eq!(err.into_inner(), Flaky(4));
}

// ============================================================================
//  CONFIGURATION
// ============================================================================

#[test]
fn test_config_fixed_from_json() {
    let policy = RetryPolicy::from_json(r#"{"kind": "fixed", "max_attempts": 3, "delay": 1}"#)
        .expect("valid config");
    assert_eq!(policy, RetryPolicy::fixed(3, Duration::from_secs(1)));
}

#[test]
fn test_config_exponential_from_value() {
    let value = serde_json::json!({
        "kind": "exponential",
        "max_attempts": 5,
        "base_delay": 0.5,
        "max_delay": 8,
    });
    let config = RetryConfig::from_value(value).expect("valid config");
    let policy = RetryPolicy::from_config(&config).expect("valid policy");

    assert_eq!(
        policy,
        RetryPolicy::exponential(5, Duration::from_millis(500), Duration::from_secs(8))
    );
}

#[test]
fn test_config_defaults() {
    let config = RetryConfig::from_json(r#"{"kind": "exponential"}"#).expect("valid config");
    assert_eq!(
        config,
        RetryConfig::Exponential { max_attempts: 10, base_delay: 5.0, max_delay: 300.0 }
    );
    assert_eq!(RetryConfig::default(), RetryConfig::Fixed { max_attempts: 10, delay: 5.0 });
}

#[test]
fn test_config_unknown_kind_fails_at_construction() {
    let err = RetryPolicy::from_json(r#"{"kind": "linear", "max_attempts": 3}"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "got {:?}", err);
}

#[test]
fn test_config_missing_kind_fails() {
    let err = RetryConfig::from_json(r#"{"max_attempts": 3}"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_config_rejects_negative_delay() {
    let config = RetryConfig::Fixed { max_attempts: 1, delay: -1.0 };
    assert_eq!(
        RetryPolicy::from_config(&config),
        Err(ConfigError::InvalidDelay { field: "delay", value: -1.0 })
    );
}

#[test]
fn test_config_rejects_inverted_delays() {
    let config = RetryConfig::Exponential { max_attempts: 1, base_delay: 10.0, max_delay: 1.0 };
    assert!(matches!(
        RetryPolicy::try_from(&config),
        Err(ConfigError::DelayOrder { .. })
    ));
}
