use std::sync::Arc;

use crate::pipeline::adapters::IdentityStage;
use crate::pipeline::chain::{Chain, FlowToSink};
use crate::pipeline::stage::Stage;
use crate::sink::Sink;

/// Reusable blueprint of a one-input, one-output processing chain.
///
/// A flow holds stage definitions only; nothing runs until it is part of a
/// materialized graph, and every materialization gets fresh stage state.
pub struct Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    stage: Arc<dyn Stage<I, O>>,
}

impl<I, O> Clone for Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
        }
    }
}

impl<T> Flow<T, T>
where
    T: Send + 'static,
{
    /// The empty flow: emits its input unchanged.
    pub fn identity() -> Self {
        Self::from_stage(IdentityStage)
    }
}

impl<I, O> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// A one-stage flow around a custom [`Stage`].
    pub fn from_stage<S>(stage: S) -> Self
    where
        S: Stage<I, O> + 'static,
    {
        Self {
            stage: Arc::new(stage),
        }
    }

    /// `self` followed by `next`.
    pub fn via<U>(self, next: Flow<O, U>) -> Flow<I, U>
    where
        U: Send + 'static,
    {
        Flow {
            stage: Arc::new(Chain::new(self.stage, next.stage)),
        }
    }

    /// `self` terminated by `sink`: a sink accepting `I` that materializes `R`.
    pub fn to<R>(self, sink: Sink<O, R>) -> Sink<I, R>
    where
        R: Send + 'static,
    {
        Sink::from_arc(Arc::new(FlowToSink::new(self.stage, sink.into_stage())))
    }

    /// Names of the stages in this flow, in order. The identity flow has none.
    pub fn stages(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.stage.describe(&mut names);
        names
    }

    pub(crate) fn into_stage(self) -> Arc<dyn Stage<I, O>> {
        self.stage
    }
}
