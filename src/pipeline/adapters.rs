use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::channel::{Inlet, Outlet};
use crate::pipeline::stage::{Stage, StageContext};

/// Wait for one unit of downstream demand, then pull one element for it.
///
/// Upstream completion and failure are taken while waiting, so they reach
/// downstream without demand. `Ok(None)` when upstream completed or
/// downstream cancelled.
pub(crate) async fn pull_on_demand<I: Send, O>(
    input: &mut Inlet<I>,
    output: &mut Outlet<O>,
) -> Result<Option<I>> {
    let granted = output.demand();
    tokio::select! {
        biased;
        closed = input.closed() => return closed.map(|()| None),
        granted = granted => {
            if !granted? {
                return Ok(None);
            }
        }
    }
    tokio::select! {
        _ = output.cancelled() => Ok(None),
        msg = input.pull() => msg.transpose(),
    }
}

/// Pass-through; the neutral element of flow composition.
pub struct IdentityStage;

#[async_trait]
impl<T> Stage<T, T> for IdentityStage
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "identity"
    }

    fn describe(&self, _names: &mut Vec<&'static str>) {}

    async fn process(
        &self,
        input: &mut Inlet<T>,
        output: &mut Outlet<T>,
        _ctx: &StageContext,
    ) -> Result<()> {
        while let Some(v) = pull_on_demand(input, output).await? {
            output.push(v)?;
        }
        Ok(())
    }
}

/// map: I -> O
pub struct MapStage<F>(pub F);

#[async_trait]
impl<I, O, F> Stage<I, O> for MapStage<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "map"
    }

    async fn process(
        &self,
        input: &mut Inlet<I>,
        output: &mut Outlet<O>,
        _ctx: &StageContext,
    ) -> Result<()> {
        while let Some(v) = pull_on_demand(input, output).await? {
            output.push((self.0)(v))?;
        }
        Ok(())
    }
}

pub struct FilterStage<P>(pub P);

#[async_trait]
impl<T, P> Stage<T, T> for FilterStage<P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "filter"
    }

    async fn process(
        &self,
        input: &mut Inlet<T>,
        output: &mut Outlet<T>,
        _ctx: &StageContext,
    ) -> Result<()> {
        // A rejected element leaves the demand unit unused for the next pull.
        while let Some(v) = pull_on_demand(input, output).await? {
            if (self.0)(&v) {
                output.push(v)?;
            }
        }
        Ok(())
    }
}

pub struct InspectStage<F>(pub F);

#[async_trait]
impl<T, F> Stage<T, T> for InspectStage<F>
where
    T: Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "inspect"
    }

    async fn process(
        &self,
        input: &mut Inlet<T>,
        output: &mut Outlet<T>,
        _ctx: &StageContext,
    ) -> Result<()> {
        while let Some(v) = pull_on_demand(input, output).await? {
            (self.0)(&v);
            output.push(v)?;
        }
        Ok(())
    }
}

/// map_concat: I -> zero or more O, flattened in order.
pub struct MapConcatStage<F>(pub F);

#[async_trait]
impl<I, O, It, F> Stage<I, O> for MapConcatStage<F>
where
    I: Send + 'static,
    O: Send + 'static,
    It: IntoIterator<Item = O>,
    It::IntoIter: Send,
    F: Fn(I) -> It + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "map_concat"
    }

    async fn process(
        &self,
        input: &mut Inlet<I>,
        output: &mut Outlet<O>,
        _ctx: &StageContext,
    ) -> Result<()> {
        while let Some(v) = pull_on_demand(input, output).await? {
            for out in (self.0)(v) {
                if !output.send(out).await? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Emit the first `n` elements, then complete and cancel upstream.
pub struct TakeStage(pub u64);

#[async_trait]
impl<T> Stage<T, T> for TakeStage
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "take"
    }

    async fn process(
        &self,
        input: &mut Inlet<T>,
        output: &mut Outlet<T>,
        _ctx: &StageContext,
    ) -> Result<()> {
        let mut remaining = self.0;
        while remaining > 0 {
            let Some(v) = pull_on_demand(input, output).await? else {
                break;
            };
            output.push(v)?;
            remaining -= 1;
        }
        Ok(())
    }
}
