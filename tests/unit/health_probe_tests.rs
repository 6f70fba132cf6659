//! Unit tests for readiness polling, backoff and cancellation.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_supervisor::supervisor::{
    AbortScope, AbortSignal, BackoffPolicy, HealthCheck, HealthProbe,
};
use agent_supervisor::{AppError, Result};

/// Fails until the `ready_on`-th call, counting every call.
struct ReadyAfter {
    ready_on: u32,
    calls: AtomicU32,
}

impl ReadyAfter {
    fn new(ready_on: u32) -> Self {
        Self {
            ready_on,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HealthCheck for ReadyAfter {
    fn check_health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = call >= self.ready_on;
        Box::pin(async move {
            if ready {
                Ok(())
            } else {
                Err(AppError::Http("connection refused".into()))
            }
        })
    }
}

/// Never answers.
struct Hangs {
    calls: AtomicU32,
}

impl HealthCheck for Hangs {
    fn check_health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::pending())
    }
}

fn fast_probe(max_attempts: u32) -> HealthProbe {
    HealthProbe::new(
        BackoffPolicy::Linear {
            base: Duration::from_millis(1),
        },
        max_attempts,
    )
}

fn open_scope() -> AbortScope {
    AbortScope::new([AbortSignal::new()])
}

#[tokio::test]
async fn succeeds_on_kth_attempt_and_stops() {
    let client = ReadyAfter::new(3);
    let state = fast_probe(10)
        .wait_until_ready(&client, &open_scope())
        .await
        .expect("ready");

    assert!(state.is_ready());
    assert_eq!(state.attempts(), 3);
    assert_eq!(client.calls(), 3, "no attempts after success");
}

#[tokio::test]
async fn first_attempt_ready_takes_one_call() {
    let client = ReadyAfter::new(1);
    let state = fast_probe(10)
        .wait_until_ready(&client, &open_scope())
        .await
        .expect("ready");
    assert_eq!(state.attempts(), 1);
}

#[tokio::test]
async fn times_out_after_exact_ceiling() {
    let client = ReadyAfter::new(u32::MAX);
    let err = fast_probe(4)
        .wait_until_ready(&client, &open_scope())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::HealthTimeout(ref msg) if msg.contains("4 attempts")));
    assert_eq!(client.calls(), 4);
}

#[tokio::test]
async fn timeout_message_carries_last_failure() {
    let client = ReadyAfter::new(u32::MAX);
    let err = fast_probe(2)
        .wait_until_ready(&client, &open_scope())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn pre_fired_signal_aborts_before_any_attempt() {
    let signal = AbortSignal::new();
    signal.abort("caller went away");
    let client = ReadyAfter::new(1);

    let err = fast_probe(10)
        .wait_until_ready(&client, &AbortScope::new([signal]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Aborted(ref reason) if reason == "caller went away"));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn abort_during_in_flight_call_resolves_promptly() {
    let signal = AbortSignal::new();
    let client = Arc::new(Hangs {
        calls: AtomicU32::new(0),
    });

    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.abort("shutdown");
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        fast_probe(100).wait_until_ready(&client, &AbortScope::new([signal])),
    )
    .await
    .expect("probe must not wait for the hung call");

    assert!(matches!(outcome, Err(AppError::Aborted(ref reason)) if reason == "shutdown"));
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abort_during_backoff_sleep_resolves_promptly() {
    let signal = AbortSignal::new();
    let client = ReadyAfter::new(u32::MAX);
    let probe = HealthProbe::new(
        BackoffPolicy::Fixed {
            delay: Duration::from_secs(60),
        },
        10,
    );

    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.abort("stop");
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        probe.wait_until_ready(&client, &AbortScope::new([signal])),
    )
    .await
    .expect("probe must not finish the backoff delay");

    assert!(matches!(outcome, Err(AppError::Aborted(_))));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn internal_scope_signal_also_stops_probe() {
    let external = AbortSignal::new();
    let until_ready = AbortSignal::new();
    until_ready.abort("child exited");
    let client = ReadyAfter::new(1);

    let err = fast_probe(10)
        .wait_until_ready(&client, &AbortScope::new([external, until_ready]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Aborted(ref reason) if reason == "child exited"));
}

#[test]
fn linear_backoff_starts_at_zero() {
    let backoff = BackoffPolicy::Linear {
        base: Duration::from_millis(5),
    };
    assert_eq!(backoff.delay_for(0), Duration::ZERO);
    assert_eq!(backoff.delay_for(1), Duration::from_millis(5));
    assert_eq!(backoff.delay_for(4), Duration::from_millis(20));
}

#[test]
fn fixed_backoff_is_constant() {
    let backoff = BackoffPolicy::Fixed {
        delay: Duration::from_millis(100),
    };
    assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
    assert_eq!(backoff.delay_for(99), Duration::from_millis(100));
}

#[test]
fn default_probe_uses_reference_ceiling() {
    assert_eq!(HealthProbe::default().max_attempts(), 100);
    assert_eq!(
        BackoffPolicy::default(),
        BackoffPolicy::Linear {
            base: Duration::from_millis(5)
        }
    );
}
