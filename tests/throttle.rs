use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::prelude::*;
use tokio::time::{Instant, MissedTickBehavior};

mod common;
use common::materializer;

const INTERVAL: Duration = Duration::from_millis(100);

#[tokio::test(start_paused = true)]
async fn five_elements_take_four_intervals() -> Result<()> {
    let start = Instant::now();
    let out = Source::from_iter(0u32..5)
        .throttle(INTERVAL)
        .run_with(Sink::collect(), &materializer())?
        .await?;
    let elapsed = start.elapsed();

    assert_eq!(out, vec![0, 1, 2, 3, 4]);
    assert!(elapsed >= INTERVAL * 4, "finished too early: {elapsed:?}");
    assert!(elapsed < INTERVAL * 5, "finished too late: {elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn emissions_are_spaced_by_the_interval() -> Result<()> {
    let start = Instant::now();
    let stamps = Source::from_iter(0u32..6)
        .throttle(INTERVAL)
        .map(move |_| start.elapsed())
        .run_with(Sink::collect(), &materializer())?
        .await?;

    assert_eq!(stamps.len(), 6);
    assert!(stamps[0] < INTERVAL, "first element should pass immediately");
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL, "gap too small: {stamps:?}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_consumer_does_not_cause_a_burst() -> Result<()> {
    let start = Instant::now();
    let stamps = Source::from_iter(0u32..4)
        .throttle(INTERVAL)
        .map_async_unordered(1, move |x| async move {
            // Downstream is much slower than the throttle for the first element.
            if x == 0 {
                tokio::time::sleep(INTERVAL * 5).await;
            }
            Ok(start.elapsed())
        })
        .run_with(Sink::collect(), &materializer())?
        .await?;

    assert_eq!(stamps.len(), 4);
    for pair in stamps[1..].windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL, "ticks piled up: {stamps:?}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burst_tick_setting_does_not_loosen_the_throttle() -> Result<()> {
    let start = Instant::now();
    let stamps = Source::from_iter(0u32..6)
        .throttle(INTERVAL)
        .map_async_unordered(1, move |x| async move {
            if x == 0 {
                tokio::time::sleep(INTERVAL * 5).await;
            }
            Ok(start.elapsed())
        })
        .run_with(Sink::collect(), &materializer().tick_missed(MissedTickBehavior::Burst))?
        .await?;

    assert_eq!(stamps.len(), 6);
    for pair in stamps[1..].windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL, "throttle burst: {stamps:?}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burst_tick_setting_still_applies_to_plain_ticks() -> Result<()> {
    let start = Instant::now();
    let stamps = Source::tick(Duration::ZERO, INTERVAL, ())
        .map_async_unordered(1, move |()| async move {
            // The first call outlasts several periods.
            if start.elapsed() < INTERVAL {
                tokio::time::sleep(INTERVAL * 5).await;
            }
            Ok(start.elapsed())
        })
        .take(4)
        .run_with(Sink::collect(), &materializer().tick_missed(MissedTickBehavior::Burst))?
        .await?;

    // Missed ticks catch up back to back.
    assert_eq!(stamps.len(), 4);
    assert_eq!(stamps[1], stamps[2]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_upstream_completes_without_waiting() -> Result<()> {
    let start = Instant::now();
    let out = Source::<u32>::empty()
        .throttle(Duration::from_secs(60))
        .run_with(Sink::collect(), &materializer())?
        .await?;

    assert!(out.is_empty());
    assert!(start.elapsed() < Duration::from_secs(60));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn upstream_error_passes_through() -> Result<()> {
    let res = Source::<u32>::failed(Error::stream("source broke"))
        .throttle(INTERVAL)
        .run_with(Sink::collect(), &materializer())?
        .await;

    assert!(matches!(res, Err(Error::Stream { context: "source broke" })));
    Ok(())
}
