use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::channel::Inlet;
use crate::pipeline::demand::UNBOUNDED;
use crate::pipeline::stage::{SinkStage, StageContext};

/// Receive every element, requesting in chunks of the run's demand batch.
///
/// Stops early, without error, once the input is cancelled.
async fn drain<T, F>(input: &mut Inlet<T>, ctx: &StageContext, mut on_item: F) -> Result<()>
where
    T: Send,
    F: FnMut(T),
{
    let batch = ctx.settings().demand_batch();
    loop {
        input.refill(batch);
        match input.next().await {
            Some(Ok(item)) => on_item(item),
            Some(Err(err)) => return Err(err),
            None => return Ok(()),
        }
    }
}

pub struct FoldSink<A, F> {
    zero: A,
    f: F,
}

impl<A, F> FoldSink<A, F> {
    pub fn new(zero: A, f: F) -> Self {
        Self { zero, f }
    }
}

#[async_trait]
impl<T, A, F> SinkStage<T, A> for FoldSink<A, F>
where
    T: Send + 'static,
    A: Clone + Send + Sync + 'static,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "fold"
    }

    async fn consume(&self, input: &mut Inlet<T>, ctx: &StageContext) -> Result<A> {
        let mut acc = Some(self.zero.clone());
        drain(input, ctx, |item| {
            acc = acc.take().map(|a| (self.f)(a, item));
        })
        .await?;
        Ok(acc.unwrap_or_else(|| self.zero.clone()))
    }
}

pub struct ForeachSink<F>(pub F);

#[async_trait]
impl<T, F> SinkStage<T, ()> for ForeachSink<F>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "foreach"
    }

    async fn consume(&self, input: &mut Inlet<T>, ctx: &StageContext) -> Result<()> {
        drain(input, ctx, |item| (self.0)(item)).await
    }
}

pub struct CollectSink<T>(PhantomData<fn() -> T>);

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> SinkStage<T, Vec<T>> for CollectSink<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "collect"
    }

    async fn consume(&self, input: &mut Inlet<T>, ctx: &StageContext) -> Result<Vec<T>> {
        let mut out = Vec::new();
        drain(input, ctx, |item| out.push(item)).await?;
        Ok(out)
    }
}

/// Requests everything at once and drops it.
pub struct IgnoreSink;

#[async_trait]
impl<T> SinkStage<T, ()> for IgnoreSink
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "ignore"
    }

    async fn consume(&self, input: &mut Inlet<T>, _ctx: &StageContext) -> Result<()> {
        input.request(UNBOUNDED);
        while let Some(item) = input.next().await {
            item?;
        }
        Ok(())
    }
}
