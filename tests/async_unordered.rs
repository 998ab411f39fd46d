use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::prelude::*;
use tokio::time::sleep;

mod common;
use common::materializer;

/// Tracks how many calls are running at once.
#[derive(Clone, Default)]
struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[tokio::test(start_paused = true)]
async fn emits_in_completion_order() -> Result<()> {
    let latencies = vec![(0u32, 300u64), (1, 100), (2, 200)];

    let out = Source::from_iter(latencies)
        .map_async_unordered(3, |(id, ms)| async move {
            sleep(Duration::from_millis(ms)).await;
            Ok(id)
        })
        .run_with(Sink::collect(), &materializer())?
        .await?;

    assert_eq!(out, vec![1, 2, 0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_parallelism() -> Result<()> {
    let gauge = Gauge::default();
    let in_stage = gauge.clone();

    let mut out = Source::from_iter(0u32..40)
        .map_async_unordered(4, move |x| {
            let gauge = in_stage.clone();
            async move {
                gauge.enter();
                sleep(Duration::from_millis(10 + u64::from(x % 7) * 5)).await;
                gauge.leave();
                Ok(x)
            }
        })
        .run_with(Sink::collect(), &materializer())?
        .await?;

    out.sort_unstable();
    assert_eq!(out, (0..40).collect::<Vec<_>>());
    assert!(gauge.peak() <= 4, "peak in flight was {}", gauge.peak());
    assert!(gauge.peak() > 1, "calls never overlapped");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_parallelism_runs_one_call_at_a_time() -> Result<()> {
    let gauge = Gauge::default();
    let in_stage = gauge.clone();

    let out = Source::from_iter(0u32..5)
        .map_async_unordered(0, move |x| {
            let gauge = in_stage.clone();
            async move {
                gauge.enter();
                sleep(Duration::from_millis(10)).await;
                gauge.leave();
                Ok(x * 2)
            }
        })
        .run_with(Sink::collect(), &materializer())?
        .await?;

    assert_eq!(out, vec![0, 2, 4, 6, 8]);
    assert_eq!(gauge.peak(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_downstream_bounds_buffered_results() -> Result<()> {
    let started = Arc::new(AtomicUsize::new(0));
    let in_stage = started.clone();

    let handle = Source::from_iter(0u32..100)
        .map_async_unordered(3, move |x| {
            in_stage.fetch_add(1, Ordering::SeqCst);
            async move { Ok(x) }
        })
        .run_with(Sink::<u32, ()>::from_stage(common::StalledSink), &materializer())?;

    sleep(Duration::from_millis(100)).await;
    // Results nobody asked for count against the limit.
    assert_eq!(started.load(Ordering::SeqCst), 3);

    handle.cancel();
    handle.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failure_aborts_other_calls() -> Result<()> {
    let finished = Arc::new(AtomicBool::new(false));
    let in_stage = finished.clone();

    let res = Source::from_iter(0u32..3)
        .map_async_unordered(3, move |x| {
            let finished = in_stage.clone();
            async move {
                if x == 1 {
                    sleep(Duration::from_millis(10)).await;
                    return Err(Error::stage("lookup", "boom"));
                }
                sleep(Duration::from_secs(1)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(x)
            }
        })
        .run_with(Sink::collect(), &materializer())?
        .await;

    assert!(matches!(res, Err(Error::Stage { stage: "lookup", .. })));

    sleep(Duration::from_secs(5)).await;
    assert!(!finished.load(Ordering::SeqCst), "in-flight call outlived the failure");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn upstream_error_fails_the_stage() -> Result<()> {
    let res = Source::<u32>::failed(Error::stream("upstream gone"))
        .map_async_unordered(2, |x| async move { Ok(x) })
        .run_with(Sink::collect(), &materializer())?
        .await;

    assert!(matches!(res, Err(Error::Stream { context: "upstream gone" })));
    Ok(())
}
