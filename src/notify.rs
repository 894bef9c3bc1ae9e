//! Callback registration lists used by every event surface of the crate.
//!
//! Callbacks run on whichever thread emits the event. Subscribers that need
//! their notifications on a specific task can use [`Subscribers::subscribe_channel`]
//! instead and drain the returned receiver wherever they like.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

/// Identifier returned on registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Subscriber<T> {
    /// Invoked inline on the emitting thread.
    Inline(Callback<T>),
    /// Forwarded into a channel, for consumers that marshal onto their own task.
    Channel(mpsc::UnboundedSender<T>),
}

/// Ordered list of subscribers for one event type.
pub struct Subscribers<T> {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<SubscriptionId, Subscriber<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn insert(&self, subscriber: Subscriber<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, subscriber);
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SubscriptionId, Subscriber<T>>> {
        // Poisoning is ignored; the map is never left half-updated.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a callback invoked on the emitting thread.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Subscriber::Inline(Arc::new(callback)))
    }

    /// Remove a subscriber. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + 'static> Subscribers<T> {
    /// Register a channel subscriber. Events are delivered in emission order.
    ///
    /// The subscription is dropped automatically on the first emit after the
    /// receiver has been closed.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.insert(Subscriber::Channel(tx)), rx)
    }

    /// Deliver `event` to every subscriber, in registration order.
    ///
    /// The subscriber list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &T) {
        let mut callbacks: Vec<Callback<T>> = Vec::new();
        let mut closed = Vec::new();
        {
            let entries = self.lock();
            for (id, subscriber) in entries.iter() {
                match subscriber {
                    Subscriber::Inline(callback) => callbacks.push(callback.clone()),
                    Subscriber::Channel(tx) => {
                        if tx.send(event.clone()).is_err() {
                            closed.push(*id);
                        }
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut entries = self.lock();
            for id in &closed {
                entries.remove(id);
            }
            debug!("Dropped {} closed channel subscribers", closed.len());
        }

        for callback in callbacks {
            callback(event);
        }
    }
}
