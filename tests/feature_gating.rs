use backflow::error::{Error, Result};
use backflow::prelude::*;

mod common;
use common::materializer;

#[test]
fn tracing_feature_gating_compiles() {
    #[cfg(feature = "tracing")]
    {
        tracing::event!(
            tracing::Level::DEBUG,
            event = "backflow.test.feature_gating",
            "backflow.test.feature_gating"
        );
    }

    #[cfg(not(feature = "tracing"))]
    {
        let marker = "tracing-disabled";
        assert_eq!(marker, "tracing-disabled");
    }
}

#[tokio::test]
async fn instrumented_runs_behave_the_same() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("backflow=debug")
        .try_init();

    let ok = Source::from_iter(0u32..4)
        .map(|x| x + 1)
        .run_with(Sink::fold(0u32, |acc, x| acc + x), &materializer())?
        .await?;
    assert_eq!(ok, 10);

    let failed = Source::<u32>::failed(Error::stream("traced failure"))
        .run_with(Sink::ignore(), &materializer())?
        .await;
    assert!(matches!(failed, Err(Error::Stream { context: "traced failure" })));
    Ok(())
}
