use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::adapters::{FilterStage, InspectStage, MapConcatStage, MapStage, TakeStage};
use crate::pipeline::async_unordered::MapAsyncUnordered;
use crate::pipeline::channel::{Inlet, Outlet};
use crate::pipeline::flow::Flow;
use crate::pipeline::stage::{drive, drive_sink, drive_source, SinkStage, SourceStage, Stage, StageContext};
use crate::pipeline::throttle::ThrottleStage;
use crate::source::Source;

/// Two stages run back to back over an internal edge.
pub(crate) struct Chain<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    first: Arc<dyn Stage<I, M>>,
    second: Arc<dyn Stage<M, O>>,
}

impl<I, M, O> Chain<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    pub fn new(first: Arc<dyn Stage<I, M>>, second: Arc<dyn Stage<M, O>>) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl<I, M, O> Stage<I, O> for Chain<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "chain"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        self.first.describe(names);
        self.second.describe(names);
    }

    async fn process(
        &self,
        input: &mut Inlet<I>,
        output: &mut Outlet<O>,
        ctx: &StageContext,
    ) -> Result<()> {
        let (mut tx_mid, mut rx_mid) = ctx.channel::<M>();

        let left = drive(&*self.first, input, &mut tx_mid, ctx);
        let right = drive(&*self.second, &mut rx_mid, output, ctx);

        // Errors travel down the internal edge, cancellation travels up it,
        // so both halves always finish on their own.
        let (left_res, right_res) = tokio::join!(left, right);
        left_res.and(right_res)
    }
}

/// A source followed by a stage.
pub(crate) struct SourceVia<M, T>
where
    M: Send + 'static,
    T: Send + 'static,
{
    source: Arc<dyn SourceStage<M>>,
    flow: Arc<dyn Stage<M, T>>,
}

impl<M, T> SourceVia<M, T>
where
    M: Send + 'static,
    T: Send + 'static,
{
    pub fn new(source: Arc<dyn SourceStage<M>>, flow: Arc<dyn Stage<M, T>>) -> Self {
        Self { source, flow }
    }
}

#[async_trait]
impl<M, T> SourceStage<T> for SourceVia<M, T>
where
    M: Send + 'static,
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "source_via"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        self.source.describe(names);
        self.flow.describe(names);
    }

    async fn produce(&self, output: &mut Outlet<T>, ctx: &StageContext) -> Result<()> {
        let (mut tx_mid, mut rx_mid) = ctx.channel::<M>();

        let left = drive_source(&*self.source, &mut tx_mid, ctx);
        let right = drive(&*self.flow, &mut rx_mid, output, ctx);

        let (left_res, right_res) = tokio::join!(left, right);
        left_res.and(right_res)
    }
}

/// A stage followed by a sink.
pub(crate) struct FlowToSink<T, M, R>
where
    T: Send + 'static,
    M: Send + 'static,
    R: Send + 'static,
{
    flow: Arc<dyn Stage<T, M>>,
    sink: Arc<dyn SinkStage<M, R>>,
}

impl<T, M, R> FlowToSink<T, M, R>
where
    T: Send + 'static,
    M: Send + 'static,
    R: Send + 'static,
{
    pub fn new(flow: Arc<dyn Stage<T, M>>, sink: Arc<dyn SinkStage<M, R>>) -> Self {
        Self { flow, sink }
    }
}

#[async_trait]
impl<T, M, R> SinkStage<T, R> for FlowToSink<T, M, R>
where
    T: Send + 'static,
    M: Send + 'static,
    R: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "flow_to_sink"
    }

    fn describe(&self, names: &mut Vec<&'static str>) {
        self.flow.describe(names);
        self.sink.describe(names);
    }

    async fn consume(&self, input: &mut Inlet<T>, ctx: &StageContext) -> Result<R> {
        let (mut tx_mid, mut rx_mid) = ctx.channel::<M>();

        let left = drive(&*self.flow, input, &mut tx_mid, ctx);
        let right = drive_sink(&*self.sink, &mut rx_mid, ctx);

        let (left_res, right_res) = tokio::join!(left, right);
        left_res.and(right_res)
    }
}

/// Stage combinators shared by [`Source`] and [`Flow`].
///
/// Every combinator appends one stage through [`FlowExt::via`]; the receiver
/// is left untouched, so blueprints can be extended in several directions.
pub trait FlowExt<T: Send + 'static>: Sized {
    /// Blueprint type produced by appending a `T -> U` flow.
    type Via<U: Send + 'static>;

    fn via<U: Send + 'static>(self, flow: Flow<T, U>) -> Self::Via<U>;

    fn map<U, F>(self, f: F) -> Self::Via<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.via(Flow::from_stage(MapStage(f)))
    }

    fn filter<P>(self, pred: P) -> Self::Via<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.via(Flow::from_stage(FilterStage(pred)))
    }

    fn inspect<F>(self, f: F) -> Self::Via<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.via(Flow::from_stage(InspectStage(f)))
    }

    fn map_concat<U, It, F>(self, f: F) -> Self::Via<U>
    where
        U: Send + 'static,
        It: IntoIterator<Item = U> + 'static,
        It::IntoIter: Send,
        F: Fn(T) -> It + Send + Sync + 'static,
    {
        self.via(Flow::from_stage(MapConcatStage(f)))
    }

    fn map_async_unordered<U, F, Fut>(self, parallelism: usize, f: F) -> Self::Via<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        self.via(Flow::from_stage(MapAsyncUnordered::new(parallelism, f)))
    }

    /// At most one element per `interval`; the first passes immediately.
    fn throttle(self, interval: Duration) -> Self::Via<T> {
        self.via(Flow::from_stage(ThrottleStage::new(interval)))
    }

    fn take(self, n: u64) -> Self::Via<T> {
        self.via(Flow::from_stage(TakeStage(n)))
    }
}

impl<T> FlowExt<T> for Source<T>
where
    T: Send + 'static,
{
    type Via<U: Send + 'static> = Source<U>;

    fn via<U: Send + 'static>(self, flow: Flow<T, U>) -> Source<U> {
        Source::via(self, flow)
    }
}

impl<I, T> FlowExt<T> for Flow<I, T>
where
    I: Send + 'static,
    T: Send + 'static,
{
    type Via<U: Send + 'static> = Flow<I, U>;

    fn via<U: Send + 'static>(self, flow: Flow<T, U>) -> Flow<I, U> {
        Flow::via(self, flow)
    }
}
