//! Live endpoints of one edge: an [`Outlet`] publishes, an [`Inlet`] subscribes.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::{Error, Result, Violation};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::demand::UNBOUNDED;
use crate::pipeline::subscription::{Publisher, Signal, Subscriber, Subscription};

/// Create a connected outlet/inlet pair whose subscription is tied to `run`.
pub fn channel<T: Send + 'static>(run: &CancelToken) -> (Outlet<T>, Inlet<T>) {
    let mut outlet = Outlet::new(run.clone());
    let (inlet, subscriber) = Inlet::new();
    outlet.subscribe(Box::new(subscriber));
    (outlet, inlet)
}

fn violation(kind: Violation) -> Error {
    if cfg!(debug_assertions) {
        panic!("reactive streams protocol violation: {kind}");
    }
    Error::Protocol(kind)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishing end of an edge.
///
/// Stages emit through [`Outlet::send`], which waits for demand, or through
/// [`Outlet::push`] once they know demand is available. Terminal signals are
/// emitted at most once; an outlet dropped without one completes.
pub struct Outlet<T> {
    run: CancelToken,
    subscription: Option<Subscription>,
    subscriber: Option<Box<dyn Subscriber<T>>>,
    terminated: bool,
}

impl<T> Outlet<T> {
    /// An outlet with no subscriber yet; see [`Publisher::subscribe`].
    pub fn new(run: CancelToken) -> Self {
        Self {
            run,
            subscription: None,
            subscriber: None,
            terminated: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.subscription {
            Some(sub) => sub.is_cancelled(),
            None => self.run.is_cancelled(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether one element may be pushed right now.
    pub fn has_demand(&self) -> bool {
        !self.terminated
            && self
                .subscription
                .as_ref()
                .is_some_and(|sub| !sub.is_cancelled() && sub.demand() > 0)
    }

    /// Wait for demand. `Ok(false)` means downstream cancelled.
    ///
    /// The returned future does not borrow the outlet, so it can sit in a
    /// `select!` next to branches that push.
    pub fn demand(&self) -> impl Future<Output = Result<bool>> + Send + 'static {
        let subscription = self.subscription.clone();
        let run = self.run.clone();
        let terminated = self.terminated;
        async move {
            if terminated {
                return Ok(false);
            }
            match subscription {
                Some(sub) => {
                    let ready = sub.ready().await?;
                    // Producers with standing demand never park; they still
                    // have to give the worker back now and then.
                    tokio::task::consume_budget().await;
                    Ok(ready)
                }
                None => {
                    run.cancelled().await;
                    Ok(false)
                }
            }
        }
    }

    /// Resolves once downstream cancels.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let subscription = self.subscription.clone();
        let run = self.run.clone();
        async move {
            match subscription {
                Some(sub) => sub.cancelled().await,
                None => run.cancelled().await,
            }
        }
    }

    /// Emit one element against outstanding demand.
    ///
    /// After downstream cancelled, the element is dropped silently.
    pub fn push(&mut self, item: T) -> Result<()> {
        if self.terminated {
            return Err(violation(Violation::SignalAfterTerminal));
        }
        let Some(sub) = &self.subscription else {
            return Err(violation(Violation::DemandExceeded));
        };
        sub.check_invalid()?;
        if sub.is_cancelled() {
            return Ok(());
        }
        if !sub.try_take() {
            return Err(violation(Violation::DemandExceeded));
        }
        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.on_next(item);
        }
        Ok(())
    }

    /// Wait for demand, then push. `Ok(false)` means downstream cancelled.
    pub async fn send(&mut self, item: T) -> Result<bool> {
        let granted = self.demand();
        if !granted.await? {
            return Ok(false);
        }
        self.push(item)?;
        Ok(true)
    }

    pub fn complete(&mut self) {
        if let Some(mut subscriber) = self.terminate() {
            subscriber.on_complete();
        }
    }

    pub fn error(&mut self, error: Error) {
        if let Some(mut subscriber) = self.terminate() {
            subscriber.on_error(error);
        }
    }

    fn terminate(&mut self) -> Option<Box<dyn Subscriber<T>>> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        let subscriber = self.subscriber.take()?;
        if self.is_cancelled() {
            return None;
        }
        Some(subscriber)
    }
}

impl<T> Publisher<T> for Outlet<T> {
    fn subscribe(&mut self, mut subscriber: Box<dyn Subscriber<T>>) {
        if self.subscription.is_some() || self.terminated {
            let rejected = Subscription::new(CancelToken::default());
            rejected.cancel();
            subscriber.on_subscribe(rejected);
            subscriber.on_error(Error::Protocol(Violation::AlreadySubscribed));
            return;
        }
        let subscription = Subscription::new(self.run.clone());
        subscriber.on_subscribe(subscription.clone());
        self.subscription = Some(subscription);
        self.subscriber = Some(subscriber);
    }
}

impl<T> Drop for Outlet<T> {
    fn drop(&mut self) {
        self.complete();
    }
}

#[derive(Default)]
struct Binding {
    subscription: Option<Subscription>,
    pending: u64,
    cancel_pending: bool,
}

struct Mailbox<T> {
    queue: Mutex<VecDeque<Signal<T>>>,
    binding: Mutex<Binding>,
    notify: Notify,
}

/// Subscriber half handed to a publisher; feeds the owning [`Inlet`].
pub struct InletSubscriber<T> {
    mailbox: Arc<Mailbox<T>>,
}

impl<T: Send> Subscriber<T> for InletSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        let mut binding = lock(&self.mailbox.binding);
        if binding.subscription.is_some() {
            subscription.cancel();
            return;
        }
        if binding.cancel_pending {
            subscription.cancel();
        } else if binding.pending > 0 {
            subscription.request(binding.pending);
        }
        binding.pending = 0;
        binding.subscription = Some(subscription);
        drop(binding);
        self.mailbox.notify.notify_one();
    }

    fn on_next(&mut self, item: T) {
        lock(&self.mailbox.queue).push_back(Signal::Next(item));
        self.mailbox.notify.notify_one();
    }

    fn on_error(&mut self, error: Error) {
        lock(&self.mailbox.queue).push_back(Signal::Error(error));
        self.mailbox.notify.notify_one();
    }

    fn on_complete(&mut self) {
        lock(&self.mailbox.queue).push_back(Signal::Complete);
        self.mailbox.notify.notify_one();
    }
}

/// Subscribing end of an edge.
///
/// The owner decides how much to request: [`Inlet::pull`] for one element
/// at a time, [`Inlet::refill`] for chunked demand, or [`Inlet::request`]
/// directly. `next` yields `None` on completion and once cancelled.
pub struct Inlet<T> {
    mailbox: Arc<Mailbox<T>>,
    outstanding: u64,
    finished: bool,
}

impl<T: Send> Inlet<T> {
    pub fn new() -> (Self, InletSubscriber<T>) {
        let mailbox = Arc::new(Mailbox {
            queue: Mutex::new(VecDeque::new()),
            binding: Mutex::new(Binding::default()),
            notify: Notify::new(),
        });
        let subscriber = InletSubscriber {
            mailbox: mailbox.clone(),
        };
        let inlet = Self {
            mailbox,
            outstanding: 0,
            finished: false,
        };
        (inlet, subscriber)
    }

    fn subscription(&self) -> Option<Subscription> {
        lock(&self.mailbox.binding).subscription.clone()
    }

    /// Requested elements not yet returned by `next`.
    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_cancelled(&self) -> bool {
        let binding = lock(&self.mailbox.binding);
        binding.cancel_pending
            || binding
                .subscription
                .as_ref()
                .is_some_and(Subscription::is_cancelled)
    }

    pub fn request(&mut self, n: u64) {
        if self.finished {
            return;
        }
        if n > 0 {
            self.outstanding = self.outstanding.saturating_add(n);
        }
        let mut binding = lock(&self.mailbox.binding);
        match &binding.subscription {
            Some(sub) => sub.request(n),
            None => binding.pending = binding.pending.saturating_add(n),
        }
    }

    /// Top outstanding demand back up to `batch` once half of it is used.
    pub fn refill(&mut self, batch: u64) {
        let batch = batch.max(1);
        if self.outstanding <= batch / 2 {
            self.request(batch - self.outstanding);
        }
    }

    pub fn cancel(&mut self) {
        let mut binding = lock(&self.mailbox.binding);
        match &binding.subscription {
            Some(sub) => sub.cancel(),
            None => binding.cancel_pending = true,
        }
    }

    /// Request one element when none is outstanding, then wait for it.
    pub async fn pull(&mut self) -> Option<Result<T>> {
        if self.outstanding == 0 {
            self.request(1);
        }
        self.next().await
    }

    /// Wait until upstream has finished and nothing is queued ahead of its
    /// terminal signal, then consume that signal.
    ///
    /// Needs no demand, so a stage can finish while its downstream is idle.
    /// Queued elements are left for `next`. Cancel safe.
    pub async fn closed(&mut self) -> Result<()> {
        loop {
            if self.finished {
                return Ok(());
            }
            let terminal = {
                let mut queue = lock(&self.mailbox.queue);
                match queue.front() {
                    Some(Signal::Complete | Signal::Error(_)) => queue.pop_front(),
                    _ => None,
                }
            };
            match terminal {
                Some(Signal::Error(err)) => {
                    self.finished = true;
                    return Err(err);
                }
                Some(_) => {
                    self.finished = true;
                    return Ok(());
                }
                None => self.mailbox.notify.notified().await,
            }
        }
    }

    /// Next signal from upstream.
    ///
    /// Cancel safe: dropping the future never loses a queued element.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.finished {
            return None;
        }
        loop {
            let signal = lock(&self.mailbox.queue).pop_front();
            match signal {
                Some(Signal::Next(item)) => {
                    if self.outstanding != UNBOUNDED {
                        self.outstanding = self.outstanding.saturating_sub(1);
                    }
                    return Some(Ok(item));
                }
                Some(Signal::Error(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                Some(Signal::Complete) => {
                    self.finished = true;
                    return None;
                }
                None => {}
            }

            if self.is_cancelled() {
                self.finished = true;
                return None;
            }

            match self.subscription() {
                Some(sub) => {
                    tokio::select! {
                        _ = self.mailbox.notify.notified() => {}
                        _ = sub.cancelled() => {}
                    }
                }
                None => self.mailbox.notify.notified().await,
            }
        }
    }
}
