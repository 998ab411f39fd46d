use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::pipeline::channel::{Inlet, Outlet};
use crate::pipeline::junction;
use crate::pipeline::stage::{drive_source, Stage, StageContext};
use crate::source::tick::TickSource;

/// Rate limit: at most one element per `interval`.
///
/// Elements are zipped with an internal tick source, so an element waits for
/// the next tick and a slow downstream never lets ticks pile up. The ticker
/// always delays late ticks, independent of the run's tick setting.
pub struct ThrottleStage {
    interval: Duration,
}

impl ThrottleStage {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl<T> Stage<T, T> for ThrottleStage
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "throttle"
    }

    async fn process(
        &self,
        input: &mut Inlet<T>,
        output: &mut Outlet<T>,
        ctx: &StageContext,
    ) -> Result<()> {
        let ticks = TickSource::new(Duration::ZERO, self.interval, ())
            .missed_tick_behavior(MissedTickBehavior::Delay);
        let (mut tick_out, mut tick_in) = ctx.channel::<()>();

        let ticking = drive_source(&ticks, &mut tick_out, ctx);
        let zipping = junction::zip(input, &mut tick_in, output, |item, ()| item);

        // zip cancels the tick edge on return, which ends the tick source.
        let (tick_res, zip_res) = tokio::join!(ticking, zipping);
        zip_res.and(tick_res)
    }
}
