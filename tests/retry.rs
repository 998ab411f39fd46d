use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::prelude::*;
use tokio::time::Instant;

mod common;
use common::materializer;

fn failing_times(n: u32, calls: Arc<AtomicU32>) -> impl Fn(u32) -> std::future::Ready<Result<u32>> {
    move |x| {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= n {
            std::future::ready(Err(Error::stage("fetch", "transient")))
        } else {
            std::future::ready(Ok(x * 2))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn retries_until_success() -> Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::new(5).base_delay(Duration::from_millis(100));

    let start = Instant::now();
    let out = policy.run("fetch", 21, failing_times(2, calls.clone())).await?;

    assert_eq!(out, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= Duration::from_millis(300));
    Ok(())
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::new(3).base_delay(Duration::ZERO);

    let res = policy.run("fetch", 1, failing_times(u32::MAX, calls.clone())).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match res {
        Err(Error::RetryExhausted {
            stage,
            attempts,
            source,
        }) => {
            assert_eq!(stage, "fetch");
            assert_eq!(attempts, 3);
            assert!(matches!(*source, Error::Stage { stage: "fetch", .. }));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn non_retryable_errors_pass_through() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let policy = RetryPolicy::new(5)
        .base_delay(Duration::ZERO)
        .retry_if(|err| matches!(err, Error::Stage { .. }));

    let res: Result<u32> = policy
        .run("parse", (), |()| {
            counted.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::stream("malformed payload")) }
        })
        .await;

    assert!(matches!(res, Err(Error::Stream { context: "malformed payload" })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let policy = RetryPolicy::new(10)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(1));

    let delays: Vec<u64> = (1..=6)
        .map(|attempt| policy.backoff_delay(attempt).as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    assert_eq!(policy.backoff_delay(200), Duration::from_secs(1));
}

#[test]
fn jitter_is_bounded_and_deterministic() {
    let base = Duration::from_millis(50);
    let jitter = Duration::from_millis(20);
    let policy = RetryPolicy::new(4)
        .base_delay(base)
        .max_delay(Duration::from_secs(10))
        .with_jitter(jitter);

    for attempt in 1..=4 {
        let plain = base * 2u32.pow(attempt - 1);
        let delay = policy.backoff_delay(attempt);
        assert!(delay >= plain && delay <= plain + jitter, "attempt {attempt}: {delay:?}");
        assert_eq!(delay, policy.clone().backoff_delay(attempt));
    }
}

#[test]
fn zero_attempts_means_one_try() {
    assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    assert_eq!(RetryPolicy::default().max_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn retrying_plugs_into_map_async_unordered() -> Result<()> {
    // Every element fails on its first attempt.
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let fetch = retrying(
        "fetch",
        RetryPolicy::new(2).base_delay(Duration::from_millis(10)),
        move |x: u32| {
            let first_try = seen.lock().expect("mutex poisoned").insert(x);
            async move {
                if first_try {
                    Err(Error::stage("fetch", "cold cache"))
                } else {
                    Ok(x + 100)
                }
            }
        },
    );

    let mut out = Source::from_iter(0u32..5)
        .map_async_unordered(3, fetch)
        .run_with(Sink::collect(), &materializer())?
        .await?;

    out.sort_unstable();
    assert_eq!(out, vec![100, 101, 102, 103, 104]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_stream() -> Result<()> {
    let fetch = retrying(
        "fetch",
        RetryPolicy::new(2).base_delay(Duration::from_millis(10)),
        |_: u32| async { Err::<u32, _>(Error::stage("fetch", "always down")) },
    );

    let res = Source::from_iter(0u32..3)
        .map_async_unordered(2, fetch)
        .run_with(Sink::collect(), &materializer())?
        .await;

    assert!(matches!(
        res,
        Err(Error::RetryExhausted {
            stage: "fetch",
            attempts: 2,
            ..
        })
    ));
    Ok(())
}
