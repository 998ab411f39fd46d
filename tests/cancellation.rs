use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::prelude::*;
use tokio::time::sleep;

mod common;
use common::{materializer, CountingSource};

const PERIOD: Duration = Duration::from_millis(10);

#[tokio::test(start_paused = true)]
async fn cancelling_the_handle_keeps_partial_results() -> Result<()> {
    let handle = Source::tick(Duration::ZERO, PERIOD, 1u32)
        .run_with(Sink::collect(), &materializer())?;

    sleep(PERIOD * 5 + PERIOD / 2).await;
    assert!(!handle.is_finished());

    handle.cancel();
    let got = handle.await?;
    assert!(
        (5..=7).contains(&got.len()),
        "expected about six ticks, got {}",
        got.len()
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelling_through_the_token_stops_a_graph() -> Result<()> {
    let mut b = GraphBuilder::new();
    let ticks = b.add_source(Source::tick(Duration::ZERO, PERIOD, 1u64));
    let numbered = b.via(ticks, Flow::<u64, u64>::identity().map(|x| x * 2));
    let (sink_in, sum) = b.add_sink_mat(Sink::fold(0u64, |acc, x| acc + x));
    b.connect(numbered, sink_in);
    let graph = b.build_mat(sum);

    let handle = materializer().run(&graph)?;
    let token = handle.cancel_token();
    sleep(PERIOD * 3).await;
    token.cancel();

    let total = handle.await?;
    assert!(total >= 2, "sum was {total}");
    assert_eq!(total % 2, 0);
    Ok(())
}

#[tokio::test]
async fn handle_reports_when_the_run_is_over() -> Result<()> {
    let handle = Source::from_iter(0u32..3).run_with(Sink::ignore(), &materializer())?;

    for _ in 0..1_000 {
        if handle.is_finished() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(handle.is_finished());
    handle.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn first_error_cancels_the_rest_of_the_run() -> Result<()> {
    let endless = CountingSource::new(u32::MAX);

    // Two unconnected pipelines in one graph: an endless one and a failing one.
    let mut b = GraphBuilder::new();
    let forever = b.add_source(Source::from_stage(endless.clone()));
    let drain = b.add_sink(Sink::ignore());
    b.connect(forever, drain);
    let failing = b.add_source(Source::from_iter(0u32..10).map_async_unordered(2, |x| async move {
        if x == 3 {
            Err(Error::stage("fetch", "upstream refused"))
        } else {
            Ok(x)
        }
    }));
    let (sink_in, collected) = b.add_sink_mat(Sink::collect());
    b.connect(failing, sink_in);

    let res = materializer().run(&b.build_mat(collected))?.await;

    match res {
        Err(Error::Stage { stage, source }) => {
            assert_eq!(stage, "fetch");
            assert_eq!(source.to_string(), "upstream refused");
        }
        other => panic!("expected the stage failure, got {other:?}"),
    }
    assert!(endless.emitted() < u32::MAX as usize);
    Ok(())
}

#[tokio::test]
async fn errors_are_not_replaced_by_partial_results() -> Result<()> {
    let res = Source::from_iter(0u32..10)
        .map_async_unordered(1, |x| async move {
            if x == 5 {
                Err(Error::stream("halfway"))
            } else {
                Ok(x)
            }
        })
        .run_with(Sink::collect(), &materializer())?
        .await;

    assert!(matches!(res, Err(Error::Stream { context: "halfway" })));
    Ok(())
}

#[tokio::test]
async fn take_cancels_an_endless_source() -> Result<()> {
    let endless = CountingSource::new(u32::MAX);
    let out = Source::from_stage(endless.clone())
        .take(5)
        .run_with(Sink::collect(), &materializer())?
        .await?;

    assert_eq!(out, vec![0, 1, 2, 3, 4]);
    assert!(endless.emitted() <= 6);
    Ok(())
}
