//! Bridges between blueprints and raw [`Publisher`]s.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::adapters::pull_on_demand;
use crate::pipeline::channel::{Inlet, Outlet};
use crate::pipeline::runtime::Materializer;
use crate::pipeline::stage::{drive_source, SourceStage, StageContext};
use crate::pipeline::subscription::{Publisher, Subscriber};

/// Source stage that subscribes to a freshly made publisher on every run and
/// forwards downstream demand to it one element at a time.
pub struct PublisherSource<F> {
    factory: F,
}

impl<F> PublisherSource<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl<T, P, F> SourceStage<T> for PublisherSource<F>
where
    T: Send + 'static,
    P: Publisher<T> + Send + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "from_publisher"
    }

    async fn produce(&self, output: &mut Outlet<T>, _ctx: &StageContext) -> Result<()> {
        let mut publisher = (self.factory)();
        let (mut input, subscriber) = Inlet::new();
        publisher.subscribe(Box::new(subscriber));

        let res = forward(&mut input, output).await;
        input.cancel();
        // Held until here: dropping an outlet-backed publisher completes it.
        drop(publisher);
        res
    }
}

async fn forward<T: Send>(input: &mut Inlet<T>, output: &mut Outlet<T>) -> Result<()> {
    while let Some(item) = pull_on_demand(input, output).await? {
        output.push(item)?;
    }
    Ok(())
}

/// A source exposed as a plain [`Publisher`].
///
/// Every `subscribe` materializes the source again on the materializer's
/// executor, so each subscriber gets its own independent run whose demand it
/// drives through the [`Subscription`](crate::pipeline::subscription::Subscription)
/// handed to `on_subscribe`.
pub struct SourcePublisher<T>
where
    T: Send + 'static,
{
    stage: Arc<dyn SourceStage<T>>,
    materializer: Materializer,
}

impl<T> SourcePublisher<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(stage: Arc<dyn SourceStage<T>>, materializer: Materializer) -> Self {
        Self {
            stage,
            materializer,
        }
    }
}

impl<T> Publisher<T> for SourcePublisher<T>
where
    T: Send + 'static,
{
    fn subscribe(&mut self, subscriber: Box<dyn Subscriber<T>>) {
        let ctx = self.materializer.context();
        let mut output = Outlet::new(ctx.run_token().clone());
        output.subscribe(subscriber);

        let stage = self.stage.clone();
        self.materializer.executor().spawn(async move {
            // The subscriber already saw the error signal; nobody awaits this task.
            let _ = drive_source(&*stage, &mut output, &ctx).await;
        });
    }
}
