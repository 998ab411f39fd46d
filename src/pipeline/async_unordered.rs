use std::collections::VecDeque;
use std::future::Future;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::error::Result;
use crate::pipeline::channel::{Inlet, Outlet};
use crate::pipeline::stage::{Stage, StageContext};

/// Runs up to `parallelism` calls at once and emits results in completion order.
///
/// Completed results waiting for downstream demand count against the limit,
/// so upstream is only pulled while `in flight + ready < parallelism`.
/// Dropping the stage's task set aborts every call still running, which is
/// what happens on failure and on cancellation.
pub struct MapAsyncUnordered<F> {
    parallelism: usize,
    f: F,
}

impl<F> MapAsyncUnordered<F> {
    pub fn new(parallelism: usize, f: F) -> Self {
        Self {
            parallelism: parallelism.max(1),
            f,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

#[async_trait]
impl<I, O, F, Fut> Stage<I, O> for MapAsyncUnordered<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "map_async_unordered"
    }

    async fn process(
        &self,
        input: &mut Inlet<I>,
        output: &mut Outlet<O>,
        ctx: &StageContext,
    ) -> Result<()> {
        let mut in_flight: JoinSet<Result<O>> = JoinSet::new();
        let mut ready: VecDeque<O> = VecDeque::new();
        let mut upstream_done = false;

        loop {
            while output.has_demand() {
                let Some(value) = ready.pop_front() else { break };
                output.push(value)?;
            }

            if upstream_done && in_flight.is_empty() && ready.is_empty() {
                break;
            }

            let can_pull = !upstream_done && in_flight.len() + ready.len() < self.parallelism;
            if can_pull && input.outstanding() == 0 {
                input.request(1);
            }

            tokio::select! {
                _ = output.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(tracing::Level::DEBUG, event = "backflow.cancelled", stage = "map_async_unordered", in_flight = in_flight.len(), "backflow.cancelled");
                    break
                },
                joined = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Some(Ok(Ok(value))) => ready.push_back(value),
                        Some(Ok(Err(err))) => return Err(err),
                        Some(Err(err)) => return Err(err.into()),
                        None => {}
                    }
                }
                msg = input.next(), if can_pull => {
                    match msg {
                        Some(Ok(item)) => {
                            in_flight.spawn_on((self.f)(item), ctx.executor());
                        }
                        Some(Err(err)) => return Err(err),
                        None => upstream_done = true,
                    }
                }
                granted = output.demand(), if !ready.is_empty() => {
                    if !granted? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
