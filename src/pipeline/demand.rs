use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value treated as "send everything".
pub const UNBOUNDED: u64 = u64::MAX;

/// Outstanding element requests from a subscriber to its publisher.
///
/// Requests accumulate by saturating addition; once the counter reaches
/// [`UNBOUNDED`] it stays there and [`Demand::try_take`] never decrements it.
#[derive(Debug, Default)]
pub struct Demand {
    outstanding: AtomicU64,
}

impl Demand {
    pub const fn new() -> Self {
        Self {
            outstanding: AtomicU64::new(0),
        }
    }

    /// Add `n` to the outstanding demand and return the new total.
    pub fn add(&self, n: u64) -> u64 {
        let prev = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(cur.saturating_add(n))
            })
            .unwrap_or_else(|cur| cur);
        prev.saturating_add(n)
    }

    /// Consume one unit of demand. Returns `false` when none is outstanding.
    pub fn try_take(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| match cur {
                0 => None,
                UNBOUNDED => Some(UNBOUNDED),
                n => Some(n - 1),
            })
            .is_ok()
    }

    pub fn get(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }
}
