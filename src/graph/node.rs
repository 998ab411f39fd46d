//! Node templates: how each kind of graph node turns its wired endpoints
//! into a running future.

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{GraphError, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::channel::{channel, Inlet, Outlet};
use crate::pipeline::junction;
use crate::pipeline::stage::{drive, drive_sink, drive_source, settle, SinkStage, SourceStage, Stage, StageContext};

/// A type-erased [`Inlet`] or [`Outlet`].
pub(crate) type Endpoint = Box<dyn Any + Send>;

/// A running node; sinks yield their materialized value.
pub(crate) type NodeFuture = BoxFuture<'static, Result<Option<Endpoint>>>;

pub(crate) type SpawnFn = dyn Fn(Ports, StageContext) -> Result<NodeFuture> + Send + Sync;

/// Allocate the live edge behind an output port of element type `T`.
pub(crate) fn make_channel<T: Send + 'static>(run: &CancelToken) -> (Endpoint, Endpoint) {
    let (outlet, inlet) = channel::<T>(run);
    (Box::new(outlet), Box::new(inlet))
}

/// Endpoints handed to one node at materialization, indexed by slot.
pub(crate) struct Ports {
    node: &'static str,
    inputs: Vec<Option<Endpoint>>,
    outputs: Vec<Option<Endpoint>>,
}

impl Ports {
    pub fn new(node: &'static str, inputs: Vec<Option<Endpoint>>, outputs: Vec<Option<Endpoint>>) -> Self {
        Self {
            node,
            inputs,
            outputs,
        }
    }

    pub fn inlet<T: Send + 'static>(&mut self, slot: usize) -> Result<Inlet<T>> {
        self.inputs
            .get_mut(slot)
            .and_then(Option::take)
            .and_then(|endpoint| endpoint.downcast::<Inlet<T>>().ok())
            .map(|inlet| *inlet)
            .ok_or_else(|| GraphError::Wiring(self.node).into())
    }

    pub fn outlet<T: Send + 'static>(&mut self, slot: usize) -> Result<Outlet<T>> {
        self.outputs
            .get_mut(slot)
            .and_then(Option::take)
            .and_then(|endpoint| endpoint.downcast::<Outlet<T>>().ok())
            .map(|outlet| *outlet)
            .ok_or_else(|| GraphError::Wiring(self.node).into())
    }

    pub fn inlets<T: Send + 'static>(&mut self) -> Result<Vec<Inlet<T>>> {
        (0..self.inputs.len()).map(|slot| self.inlet(slot)).collect()
    }

    pub fn outlets<T: Send + 'static>(&mut self) -> Result<Vec<Outlet<T>>> {
        (0..self.outputs.len()).map(|slot| self.outlet(slot)).collect()
    }
}

pub(crate) fn source<T>(stage: Arc<dyn SourceStage<T>>) -> Box<SpawnFn>
where
    T: Send + 'static,
{
    Box::new(move |mut ports: Ports, ctx: StageContext| {
        let output = ports.outlet::<T>(0)?;
        Ok(Box::pin(run_source(stage.clone(), output, ctx)) as NodeFuture)
    })
}

async fn run_source<T>(
    stage: Arc<dyn SourceStage<T>>,
    mut output: Outlet<T>,
    ctx: StageContext,
) -> Result<Option<Endpoint>>
where
    T: Send + 'static,
{
    drive_source(&*stage, &mut output, &ctx).await?;
    Ok(None)
}

pub(crate) fn flow<I, O>(stage: Arc<dyn Stage<I, O>>) -> Box<SpawnFn>
where
    I: Send + 'static,
    O: Send + 'static,
{
    Box::new(move |mut ports: Ports, ctx: StageContext| {
        let input = ports.inlet::<I>(0)?;
        let output = ports.outlet::<O>(0)?;
        Ok(Box::pin(run_flow(stage.clone(), input, output, ctx)) as NodeFuture)
    })
}

async fn run_flow<I, O>(
    stage: Arc<dyn Stage<I, O>>,
    mut input: Inlet<I>,
    mut output: Outlet<O>,
    ctx: StageContext,
) -> Result<Option<Endpoint>>
where
    I: Send + 'static,
    O: Send + 'static,
{
    drive(&*stage, &mut input, &mut output, &ctx).await?;
    Ok(None)
}

pub(crate) fn sink<T, R>(stage: Arc<dyn SinkStage<T, R>>) -> Box<SpawnFn>
where
    T: Send + 'static,
    R: Send + 'static,
{
    Box::new(move |mut ports: Ports, ctx: StageContext| {
        let input = ports.inlet::<T>(0)?;
        Ok(Box::pin(run_sink(stage.clone(), input, ctx)) as NodeFuture)
    })
}

async fn run_sink<T, R>(
    stage: Arc<dyn SinkStage<T, R>>,
    mut input: Inlet<T>,
    ctx: StageContext,
) -> Result<Option<Endpoint>>
where
    T: Send + 'static,
    R: Send + 'static,
{
    let value = drive_sink(&*stage, &mut input, &ctx).await?;
    Ok(Some(Box::new(value) as Endpoint))
}

/// Source and sink joined in a single task, for linear pipelines.
pub(crate) fn linear<T, R>(source: Arc<dyn SourceStage<T>>, sink: Arc<dyn SinkStage<T, R>>) -> Box<SpawnFn>
where
    T: Send + 'static,
    R: Send + 'static,
{
    Box::new(move |_ports: Ports, ctx: StageContext| {
        Ok(Box::pin(run_linear(source.clone(), sink.clone(), ctx)) as NodeFuture)
    })
}

async fn run_linear<T, R>(
    source: Arc<dyn SourceStage<T>>,
    sink: Arc<dyn SinkStage<T, R>>,
    ctx: StageContext,
) -> Result<Option<Endpoint>>
where
    T: Send + 'static,
    R: Send + 'static,
{
    let (mut output, mut input) = ctx.channel::<T>();
    let (produced, consumed) = tokio::join!(
        drive_source(&*source, &mut output, &ctx),
        drive_sink(&*sink, &mut input, &ctx),
    );
    produced?;
    let value = consumed?;
    Ok(Some(Box::new(value) as Endpoint))
}

pub(crate) fn zip<A, B>() -> Box<SpawnFn>
where
    A: Send + 'static,
    B: Send + 'static,
{
    Box::new(|mut ports: Ports, _ctx: StageContext| {
        let left = ports.inlet::<A>(0)?;
        let right = ports.inlet::<B>(1)?;
        let output = ports.outlet::<(A, B)>(0)?;
        Ok(Box::pin(run_zip(left, right, output)) as NodeFuture)
    })
}

async fn run_zip<A, B>(
    mut left: Inlet<A>,
    mut right: Inlet<B>,
    mut output: Outlet<(A, B)>,
) -> Result<Option<Endpoint>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let res = junction::zip(&mut left, &mut right, &mut output, |a, b| (a, b)).await;
    settle("zip", res, &mut output)?;
    Ok(None)
}

pub(crate) fn broadcast<T>() -> Box<SpawnFn>
where
    T: Clone + Send + 'static,
{
    Box::new(|mut ports: Ports, _ctx: StageContext| {
        let input = ports.inlet::<T>(0)?;
        let outputs = ports.outlets::<T>()?;
        Ok(Box::pin(run_broadcast(input, outputs)) as NodeFuture)
    })
}

async fn run_broadcast<T>(mut input: Inlet<T>, mut outputs: Vec<Outlet<T>>) -> Result<Option<Endpoint>>
where
    T: Clone + Send + 'static,
{
    let res = junction::broadcast(&mut input, &mut outputs).await;
    junction::settle_all(res, &mut outputs)?;
    Ok(None)
}

pub(crate) fn merge<T>() -> Box<SpawnFn>
where
    T: Send + 'static,
{
    Box::new(|mut ports: Ports, _ctx: StageContext| {
        let inputs = ports.inlets::<T>()?;
        let output = ports.outlet::<T>(0)?;
        Ok(Box::pin(run_merge(inputs, output)) as NodeFuture)
    })
}

async fn run_merge<T>(mut inputs: Vec<Inlet<T>>, mut output: Outlet<T>) -> Result<Option<Endpoint>>
where
    T: Send + 'static,
{
    let res = junction::merge(&mut inputs, &mut output).await;
    settle("merge", res, &mut output)?;
    Ok(None)
}
