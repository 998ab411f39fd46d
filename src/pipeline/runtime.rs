use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle as TokioHandle;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::{Error, GraphError, Result};
use crate::graph::node::{Endpoint, NodeFuture, Ports};
use crate::graph::{Direction, Graph};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::Settings;
use crate::pipeline::stage::StageContext;

/// Turns graph blueprints into running tasks on an explicit executor.
///
/// ```no_run
/// use backflow::prelude::*;
///
/// # async fn demo() -> backflow::error::Result<()> {
/// let mat = Materializer::try_current()?.demand_batch(64);
/// let sum = Source::from_iter(1..=10u64)
///     .map(|x| x * 2)
///     .run_with(Sink::fold(0u64, |acc, x| acc + x), &mat)?
///     .await?;
/// assert_eq!(sum, 110);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Materializer {
    executor: TokioHandle,
    settings: Settings,
}

impl Materializer {
    pub fn new(executor: TokioHandle) -> Self {
        Self {
            executor,
            settings: Settings::default(),
        }
    }

    /// A materializer on the runtime the caller is running in.
    pub fn try_current() -> Result<Self> {
        let executor =
            TokioHandle::try_current().map_err(|_| Error::stream("no tokio runtime is running"))?;
        Ok(Self::new(executor))
    }

    /// Chunk size sinks use when requesting from upstream.
    pub fn demand_batch(mut self, n: u64) -> Self {
        self.settings.set_demand_batch(n);
        self
    }

    pub fn tick_missed(mut self, behavior: MissedTickBehavior) -> Self {
        self.settings.set_tick_missed(behavior);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &TokioHandle {
        &self.executor
    }

    /// Context for one fresh run.
    pub(crate) fn context(&self) -> StageContext {
        StageContext::new(
            CancelToken::default(),
            self.executor.clone(),
            self.settings.clone(),
        )
    }

    /// Wire every edge of `graph`, spawn its nodes and return the run handle.
    ///
    /// Fails without spawning anything when the graph still has open ends.
    /// The graph itself is left untouched and can be run again.
    pub fn run<M>(&self, graph: &Graph<M>) -> Result<Handle<M>>
    where
        M: Send + 'static,
    {
        let open = graph.open_ends();
        if !open.is_empty() {
            return Err(GraphError::OpenEnds(open).into());
        }

        let ctx = self.context();
        let run = ctx.run_token().clone();
        let layout = graph.layout();

        let mut endpoints: Vec<Option<Endpoint>> = layout.ports.iter().map(|_| None).collect();
        for edge in &layout.edges {
            let (outlet, inlet) = (layout.ports[edge.from].connect)(&run);
            endpoints[edge.from] = Some(outlet);
            endpoints[edge.to] = Some(inlet);
        }

        // Ports are declared in slot order, so pushing keeps slots aligned.
        let mut inputs: Vec<Vec<Option<Endpoint>>> = layout.nodes.iter().map(|_| Vec::new()).collect();
        let mut outputs: Vec<Vec<Option<Endpoint>>> = layout.nodes.iter().map(|_| Vec::new()).collect();
        for (port, endpoint) in layout.ports.iter().zip(endpoints) {
            match port.direction {
                Direction::In => inputs[port.node].push(endpoint),
                Direction::Out => outputs[port.node].push(endpoint),
            }
        }

        let mut nodes = Vec::with_capacity(layout.nodes.len());
        let wiring = layout.nodes.iter().zip(inputs.into_iter().zip(outputs));
        for (index, (node, (ins, outs))) in wiring.enumerate() {
            let fut = (node.spawn)(Ports::new(node.name, ins, outs), ctx.clone())?;
            nodes.push(instrument(fut, node.name, index));
        }

        #[cfg(feature = "tracing")]
        tracing::event!(tracing::Level::DEBUG, event = "backflow.run.started", nodes = nodes.len(), edges = layout.edges.len(), "backflow.run.started");

        let mut tasks = JoinSet::new();
        for (index, fut) in nodes.into_iter().enumerate() {
            tasks.spawn_on(async move { (index, fut.await) }, &self.executor);
        }

        let result_node = graph.result_node();
        let finish = graph.finisher();
        let supervisor = supervise(tasks, run.clone(), result_node);
        let join = self
            .executor
            .spawn(async move { finish(supervisor.await?) });

        Ok(Handle { join, run })
    }
}

async fn supervise(
    mut tasks: JoinSet<(usize, Result<Option<Endpoint>>)>,
    run: CancelToken,
    result_node: Option<usize>,
) -> Result<Option<Endpoint>> {
    let mut first_error: Option<Error> = None;
    let mut value = None;

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((index, Ok(out))) => {
                if Some(index) == result_node {
                    value = out;
                }
                continue;
            }
            Ok((_, Err(err))) => err,
            Err(err) => Error::from(err),
        };
        if first_error.is_none() {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::WARN, event = "backflow.run.failed", error = %failure, "backflow.run.failed");
            run.cancel();
            first_error = Some(failure);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::DEBUG, event = "backflow.run.completed", cancelled = run.is_cancelled(), "backflow.run.completed");
            Ok(value)
        }
    }
}

#[cfg(feature = "tracing")]
fn instrument(fut: NodeFuture, node: &'static str, index: usize) -> NodeFuture {
    use tracing::Instrument;
    Box::pin(fut.instrument(tracing::debug_span!("backflow.node", node = node, index = index)))
}

#[cfg(not(feature = "tracing"))]
fn instrument(fut: NodeFuture, _node: &'static str, _index: usize) -> NodeFuture {
    fut
}

/// Completion of one materialized run.
///
/// Resolves to the designated sink's value, or to the first error raised
/// anywhere in the run. Dropping the handle does not stop the run.
pub struct Handle<M> {
    join: JoinHandle<Result<M>>,
    run: CancelToken,
}

impl<M> Handle<M> {
    /// Cancel every subscription of the run. Sinks complete with what they
    /// have received so far.
    pub fn cancel(&self) {
        #[cfg(feature = "tracing")]
        tracing::event!(tracing::Level::DEBUG, event = "backflow.run.cancel", "backflow.run.cancel");
        self.run.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.run.clone()
    }
}

impl<M> Future for Handle<M> {
    type Output = Result<M>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}
