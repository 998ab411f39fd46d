//! Sinks: blueprints with one input that materialize a value.

pub mod fold;

use std::sync::Arc;

use crate::pipeline::stage::SinkStage;

use fold::{CollectSink, FoldSink, ForeachSink, IgnoreSink};

/// Reusable blueprint of an element consumer producing `R` when its input
/// completes.
///
/// Every run starts from a fresh accumulator. When the run is cancelled the
/// sink completes with what it received so far.
pub struct Sink<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    stage: Arc<dyn SinkStage<T, R>>,
}

impl<T, R> Clone for Sink<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
        }
    }
}

impl<T, R> Sink<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn from_stage<S>(stage: S) -> Self
    where
        S: SinkStage<T, R> + 'static,
    {
        Self {
            stage: Arc::new(stage),
        }
    }

    pub(crate) fn from_arc(stage: Arc<dyn SinkStage<T, R>>) -> Self {
        Self { stage }
    }

    /// Combine every element into an accumulator starting at `zero`.
    pub fn fold<F>(zero: R, f: F) -> Self
    where
        R: Clone + Sync,
        F: Fn(R, T) -> R + Send + Sync + 'static,
    {
        Self::from_stage(FoldSink::new(zero, f))
    }

    /// Names of the stages in this sink, in order.
    pub fn stages(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.stage.describe(&mut names);
        names
    }

    pub(crate) fn into_stage(self) -> Arc<dyn SinkStage<T, R>> {
        self.stage
    }
}

impl<T> Sink<T, ()>
where
    T: Send + 'static,
{
    pub fn foreach<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::from_stage(ForeachSink(f))
    }

    /// Drain without looking at the elements, with unbounded demand.
    pub fn ignore() -> Self {
        Self::from_stage(IgnoreSink)
    }
}

impl<T> Sink<T, Vec<T>>
where
    T: Send + 'static,
{
    pub fn collect() -> Self {
        Self::from_stage(CollectSink::new())
    }
}
