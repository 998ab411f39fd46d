use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::Result;
use crate::pipeline::channel::Outlet;
use crate::pipeline::stage::{SourceStage, StageContext};

/// Emits `value` every `period`, starting after `initial_delay`.
///
/// A tick is only taken once downstream has demand, so ticks never queue
/// up; how a late tick catches up is governed by the run's
/// [`Settings::tick_missed`](crate::pipeline::config::Settings::tick_missed)
/// unless the source pins its own behavior.
/// Runs until cancelled.
pub struct TickSource<T> {
    initial_delay: Duration,
    period: Duration,
    value: T,
    missed: Option<MissedTickBehavior>,
}

impl<T> TickSource<T> {
    /// A zero `period` is raised to one nanosecond.
    pub fn new(initial_delay: Duration, period: Duration, value: T) -> Self {
        Self {
            initial_delay,
            period: period.max(Duration::from_nanos(1)),
            value,
            missed: None,
        }
    }

    /// Use `behavior` for late ticks whatever the run settings say.
    pub fn missed_tick_behavior(mut self, behavior: MissedTickBehavior) -> Self {
        self.missed = Some(behavior);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl<T> SourceStage<T> for TickSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "tick"
    }

    async fn produce(&self, output: &mut Outlet<T>, ctx: &StageContext) -> Result<()> {
        let mut ticks = interval_at(Instant::now() + self.initial_delay, self.period);
        ticks.set_missed_tick_behavior(self.missed.unwrap_or_else(|| ctx.settings().tick_missed()));

        loop {
            let granted = output.demand();
            if !granted.await? {
                break;
            }
            let cancelled = output.cancelled();
            tokio::select! {
                _ = cancelled => break,
                _ = ticks.tick() => output.push(self.value.clone())?,
            }
        }

        #[cfg(feature = "tracing")]
        tracing::event!(tracing::Level::DEBUG, event = "backflow.cancelled", stage = "tick", "backflow.cancelled");
        Ok(())
    }
}
