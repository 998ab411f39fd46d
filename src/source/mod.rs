//! Sources: blueprints with one output and no input.

pub(crate) mod combine;
pub mod iter;
pub mod publisher;
pub mod tick;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::pipeline::chain::SourceVia;
use crate::pipeline::flow::Flow;
use crate::pipeline::runtime::{Handle, Materializer};
use crate::pipeline::stage::SourceStage;
use crate::pipeline::subscription::Publisher;
use crate::sink::Sink;

use combine::{MergeSources, ZipSources};
use iter::{EmptySource, IterSource};
use publisher::{PublisherSource, SourcePublisher};
use tick::TickSource;

/// Reusable blueprint of an element producer.
///
/// ```no_run
/// use backflow::prelude::*;
///
/// # async fn demo() -> backflow::error::Result<()> {
/// let mat = Materializer::try_current()?;
/// let words = Source::from_iter(vec!["a b", "c"])
///     .map_concat(|line: &str| line.split(' ').map(str::to_owned).collect::<Vec<_>>())
///     .run_with(Sink::collect(), &mat)?
///     .await?;
/// assert_eq!(words, ["a", "b", "c"]);
/// # Ok(())
/// # }
/// ```
pub struct Source<T>
where
    T: Send + 'static,
{
    stage: Arc<dyn SourceStage<T>>,
}

impl<T> Clone for Source<T>
where
    T: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
        }
    }
}

impl<T> Source<T>
where
    T: Send + 'static,
{
    pub fn from_stage<S>(stage: S) -> Self
    where
        S: SourceStage<T> + 'static,
    {
        Self {
            stage: Arc::new(stage),
        }
    }

    pub(crate) fn from_arc(stage: Arc<dyn SourceStage<T>>) -> Self {
        Self { stage }
    }

    /// Emits every element of `iter`. Each run iterates its own clone.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send,
    {
        Self::from_stage(IterSource::new(iter))
    }

    pub fn single(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iter(Some(value))
    }

    pub fn empty() -> Self {
        Self::from_stage(EmptySource::new())
    }

    /// Fails every run with `error` before emitting anything.
    pub fn failed(error: Error) -> Self {
        Self::from_stage(EmptySource::failed(error))
    }

    /// Emits `value` every `period` after `initial_delay`, until cancelled.
    pub fn tick(initial_delay: Duration, period: Duration, value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_stage(TickSource::new(initial_delay, period, value))
    }

    /// Adapt a raw publisher. `factory` is called once per run.
    pub fn from_publisher<P, F>(factory: F) -> Self
    where
        P: Publisher<T> + Send + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::from_stage(PublisherSource::new(factory))
    }

    pub fn via<U>(self, flow: Flow<T, U>) -> Source<U>
    where
        U: Send + 'static,
    {
        Source::from_arc(Arc::new(SourceVia::new(self.stage, flow.into_stage())))
    }

    /// Pair elements with those of `other`; completes with the shorter one.
    pub fn zip<U>(self, other: Source<U>) -> Source<(T, U)>
    where
        U: Send + 'static,
    {
        Source::from_arc(Arc::new(ZipSources::new(self.stage, other.stage)))
    }

    /// Interleave with `other`; completes when both have completed.
    pub fn merge(self, other: Source<T>) -> Source<T> {
        Source::from_arc(Arc::new(MergeSources::new(vec![self.stage, other.stage])))
    }

    /// A closed graph whose result is the value `sink` materializes.
    pub fn to<R>(self, sink: Sink<T, R>) -> Graph<R>
    where
        R: Send + 'static,
    {
        Graph::linear(self, sink)
    }

    /// Materialize `self` into `sink` right away.
    pub fn run_with<R>(self, sink: Sink<T, R>, materializer: &Materializer) -> Result<Handle<R>>
    where
        R: Send + 'static,
    {
        materializer.run(&self.to(sink))
    }

    pub fn into_publisher(self, materializer: &Materializer) -> SourcePublisher<T> {
        SourcePublisher::new(self.stage, materializer.clone())
    }

    /// Names of the stages in this source, in order.
    pub fn stages(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.stage.describe(&mut names);
        names
    }

    pub(crate) fn into_stage(self) -> Arc<dyn SourceStage<T>> {
        self.stage
    }
}
