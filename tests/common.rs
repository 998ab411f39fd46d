#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use backflow::error::{Error, Result};
use backflow::pipeline::channel::{Inlet, Outlet};
use backflow::pipeline::runtime::Materializer;
use backflow::pipeline::stage::{SinkStage, SourceStage, StageContext};
use backflow::pipeline::subscription::{Subscriber, Subscription};

pub fn materializer() -> Materializer {
    Materializer::new(tokio::runtime::Handle::current())
}

/// What a [`TestSubscriber`] observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    Next(T),
    Error(String),
    Complete,
}

/// Recording subscriber driven by hand from the test.
pub struct TestSubscriber<T> {
    events: Arc<Mutex<Vec<Event<T>>>>,
    subscription: Arc<Mutex<Option<Subscription>>>,
    subscribed: Arc<AtomicUsize>,
}

impl<T> Clone for TestSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            subscription: self.subscription.clone(),
            subscribed: self.subscribed.clone(),
        }
    }
}

impl<T: Clone> TestSubscriber<T> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            subscription: Arc::new(Mutex::new(None)),
            subscribed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription
            .lock()
            .expect("mutex poisoned")
            .clone()
            .expect("subscriber was never subscribed")
    }

    pub fn request(&self, n: u64) {
        self.subscription().request(n);
    }

    pub fn cancel(&self) {
        self.subscription().cancel();
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event<T>> {
        self.events.lock().expect("mutex poisoned").clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Next(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn next_count(&self) -> usize {
        self.items().len()
    }

    pub fn is_terminated(&self) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::Error(_) | Event::Complete))
    }

    /// Poll until `cond` holds; gives up after a few seconds of (possibly
    /// paused) time.
    pub async fn wait_for(&self, cond: impl Fn(&Self) -> bool) {
        for _ in 0..5_000 {
            if cond(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("subscriber condition not reached");
    }
}

impl<T: Send> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        *self.subscription.lock().expect("mutex poisoned") = Some(subscription);
    }

    fn on_next(&mut self, item: T) {
        self.events
            .lock()
            .expect("mutex poisoned")
            .push(Event::Next(item));
    }

    fn on_error(&mut self, error: Error) {
        self.events
            .lock()
            .expect("mutex poisoned")
            .push(Event::Error(error.to_string()));
    }

    fn on_complete(&mut self) {
        self.events
            .lock()
            .expect("mutex poisoned")
            .push(Event::Complete);
    }
}

/// Emits `0..len` and counts how many elements actually left the source.
#[derive(Clone)]
pub struct CountingSource {
    len: u32,
    emitted: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(len: u32) -> Self {
        Self {
            len,
            emitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceStage<u32> for CountingSource {
    fn stage_name(&self) -> &'static str {
        "counting"
    }

    async fn produce(&self, output: &mut Outlet<u32>, _ctx: &StageContext) -> Result<()> {
        for i in 0..self.len {
            if !output.send(i).await? {
                break;
            }
            self.emitted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A sink that never requests anything and waits to be cancelled.
pub struct StalledSink;

#[async_trait]
impl<T: Send + 'static> SinkStage<T, ()> for StalledSink {
    fn stage_name(&self) -> &'static str {
        "stalled"
    }

    async fn consume(&self, input: &mut Inlet<T>, _ctx: &StageContext) -> Result<()> {
        while let Some(item) = input.next().await {
            item?;
        }
        Ok(())
    }
}
