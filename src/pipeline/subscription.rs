//! The publisher / subscriber / subscription contract.
//!
//! Elements travel downstream through [`Subscriber::on_next`]; demand and
//! cancellation travel upstream through [`Subscription`]. A publisher never
//! emits more elements than have been requested and never signals anything
//! after `on_error` or `on_complete`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::demand::Demand;

/// A demand-driven element consumer.
pub trait Subscriber<T>: Send {
    /// Called exactly once, before any other signal.
    fn on_subscribe(&mut self, subscription: Subscription);

    fn on_next(&mut self, item: T);

    fn on_error(&mut self, error: Error);

    fn on_complete(&mut self);
}

/// A demand-driven element source.
pub trait Publisher<T> {
    fn subscribe(&mut self, subscriber: Box<dyn Subscriber<T>>);
}

/// One downstream signal, as recorded by mailbox-based subscribers.
#[derive(Debug)]
pub enum Signal<T> {
    Next(T),
    Error(Error),
    Complete,
}

struct State {
    demand: Demand,
    cancelled: AtomicBool,
    invalid: AtomicBool,
    notify: Notify,
    run: CancelToken,
}

/// Live binding between one publisher and one subscriber.
///
/// Cloning shares the same counter and flags; the subscriber side uses its
/// clone to request and cancel, the publisher side to wait for demand.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<State>,
}

impl Subscription {
    /// A subscription that is also cancelled when `run` is cancelled.
    pub fn new(run: CancelToken) -> Self {
        Self {
            state: Arc::new(State {
                demand: Demand::new(),
                cancelled: AtomicBool::new(false),
                invalid: AtomicBool::new(false),
                notify: Notify::new(),
                run,
            }),
        }
    }

    /// Authorize the publisher to send `n` more elements.
    ///
    /// `request(0)` is illegal; the publisher fails the stream with
    /// [`Error::InvalidDemand`] the next time it checks for demand.
    pub fn request(&self, n: u64) {
        if n == 0 {
            self.state.invalid.store(true, Ordering::SeqCst);
        } else {
            self.state.demand.add(n);
        }
        self.state.notify.notify_waiters();
    }

    /// Stop the publisher. Idempotent.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst) || self.state.run.is_cancelled()
    }

    /// Currently outstanding demand.
    pub fn demand(&self) -> u64 {
        self.state.demand.get()
    }

    pub(crate) fn try_take(&self) -> bool {
        self.state.demand.try_take()
    }

    pub(crate) fn check_invalid(&self) -> Result<()> {
        if self.state.invalid.load(Ordering::SeqCst) {
            return Err(Error::InvalidDemand);
        }
        Ok(())
    }

    /// Wait until demand is available (`true`) or the subscription is
    /// cancelled (`false`).
    pub(crate) async fn ready(&self) -> Result<bool> {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.check_invalid()?;
            if self.is_cancelled() {
                return Ok(false);
            }
            if self.state.demand.get() > 0 {
                return Ok(true);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.state.run.cancelled() => {}
            }
        }
    }

    /// Resolves once the subscription is cancelled, directly or through the run.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.state.run.cancelled() => {}
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("demand", &self.demand())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
