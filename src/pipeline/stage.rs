use async_trait::async_trait;
use tokio::runtime::Handle;

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::channel::{channel, Inlet, Outlet};
use crate::pipeline::config::Settings;

/// Everything a running stage may need besides its endpoints.
#[derive(Clone)]
pub struct StageContext {
    run: CancelToken,
    executor: Handle,
    settings: Settings,
}

impl StageContext {
    pub fn new(run: CancelToken, executor: Handle, settings: Settings) -> Self {
        Self {
            run,
            executor,
            settings,
        }
    }

    /// Token shared by every subscription of this run.
    pub fn run_token(&self) -> &CancelToken {
        &self.run
    }

    /// Executor that owns this run; stages spawn helper tasks here.
    pub fn executor(&self) -> &Handle {
        &self.executor
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A fresh edge belonging to this run.
    pub fn channel<T: Send + 'static>(&self) -> (Outlet<T>, Inlet<T>) {
        channel(&self.run)
    }
}

/// A transformation node: consumes from `input`, emits to `output`.
///
/// `process` returns when the stage is done. The caller then cancels the
/// input and sends the terminal signal downstream, so implementations only
/// return `Ok(())` or the error to forward.
#[async_trait]
pub trait Stage<I: Send + 'static, O: Send + 'static>: Send + Sync {
    fn stage_name(&self) -> &'static str {
        "stage"
    }

    /// Append the names of the stages this one is made of, in order.
    fn describe(&self, names: &mut Vec<&'static str>) {
        names.push(self.stage_name());
    }

    async fn process(
        &self,
        input: &mut Inlet<I>,
        output: &mut Outlet<O>,
        ctx: &StageContext,
    ) -> Result<()>;
}

/// A node with no input.
#[async_trait]
pub trait SourceStage<T: Send + 'static>: Send + Sync {
    fn stage_name(&self) -> &'static str {
        "source"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        names.push(self.stage_name());
    }

    async fn produce(&self, output: &mut Outlet<T>, ctx: &StageContext) -> Result<()>;
}

/// A node with no output that materializes a value of type `R`.
#[async_trait]
pub trait SinkStage<T: Send + 'static, R: Send + 'static>: Send + Sync {
    fn stage_name(&self) -> &'static str {
        "sink"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        names.push(self.stage_name());
    }

    async fn consume(&self, input: &mut Inlet<T>, ctx: &StageContext) -> Result<R>;
}

/// Run a stage to the end and settle both of its edges.
pub async fn drive<I, O, S>(
    stage: &S,
    input: &mut Inlet<I>,
    output: &mut Outlet<O>,
    ctx: &StageContext,
) -> Result<()>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Stage<I, O> + ?Sized,
{
    let res = stage.process(input, output, ctx).await;
    input.cancel();
    settle(stage.stage_name(), res, output)
}

pub async fn drive_source<T, S>(stage: &S, output: &mut Outlet<T>, ctx: &StageContext) -> Result<()>
where
    T: Send + 'static,
    S: SourceStage<T> + ?Sized,
{
    let res = stage.produce(output, ctx).await;
    settle(stage.stage_name(), res, output)
}

pub async fn drive_sink<T, R, S>(stage: &S, input: &mut Inlet<T>, ctx: &StageContext) -> Result<R>
where
    T: Send + 'static,
    R: Send + 'static,
    S: SinkStage<T, R> + ?Sized,
{
    let res = stage.consume(input, ctx).await;
    input.cancel();

    #[cfg(feature = "tracing")]
    if let Err(err) = &res {
        tracing::event!(tracing::Level::WARN, event = "backflow.stage.failed", stage = stage.stage_name(), error = %err, "backflow.stage.failed");
    }

    res
}

pub(crate) fn settle<O>(stage: &'static str, res: Result<()>, output: &mut Outlet<O>) -> Result<()> {
    #[cfg(not(feature = "tracing"))]
    let _ = stage;

    match res {
        Ok(()) => {
            output.complete();
            Ok(())
        }
        // Nobody downstream is listening any more; the failure has no consumer.
        Err(_err) if output.is_cancelled() => {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::DEBUG, event = "backflow.downstream.closed", stage = stage, error = %_err, "backflow.downstream.closed");
            output.complete();
            Ok(())
        }
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::WARN, event = "backflow.stage.failed", stage = stage, error = %err, "backflow.stage.failed");
            output.error(err.clone());
            Err(err)
        }
    }
}
