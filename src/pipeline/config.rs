use tokio::time::MissedTickBehavior;

pub(crate) const DEFAULT_DEMAND_BATCH: u64 = 16;

/// Run-wide knobs, configured on the materializer and shared with every stage.
#[derive(Clone, Debug)]
pub struct Settings {
    demand_batch: u64,
    tick_missed: MissedTickBehavior,
}

impl Settings {
    /// How many elements sinks request at a time.
    pub fn demand_batch(&self) -> u64 {
        self.demand_batch
    }

    /// How `Source::tick` sources catch up after a backpressured period.
    /// The throttle keeps its own pacing regardless.
    pub fn tick_missed(&self) -> MissedTickBehavior {
        self.tick_missed
    }

    pub(crate) fn set_demand_batch(&mut self, n: u64) {
        self.demand_batch = n.max(1);
    }

    pub(crate) fn set_tick_missed(&mut self, behavior: MissedTickBehavior) {
        self.tick_missed = behavior;
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            demand_batch: DEFAULT_DEMAND_BATCH,
            tick_missed: MissedTickBehavior::Delay,
        }
    }
}
