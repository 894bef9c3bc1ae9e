//! Take list change notifications.

use tokio::sync::mpsc;

use super::models::TakeId;
use crate::notify::{SubscriptionId, Subscribers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeEvent {
    Added(TakeId),
    Updated(TakeId),
    Removed(TakeId),
    ListReset,
}

/// Subscription point for take events of one device.
///
/// Callbacks run on the thread performing the take list update; use
/// [`subscribe_channel`](Self::subscribe_channel) to receive events elsewhere.
#[derive(Default)]
pub struct TakeEvents {
    subscribers: Subscribers<TakeEvent>,
}

impl TakeEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every take event.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TakeEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn on_take_added<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(TakeId) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let TakeEvent::Added(id) = event {
                callback(*id);
            }
        })
    }

    pub fn on_take_updated<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(TakeId) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let TakeEvent::Updated(id) = event {
                callback(*id);
            }
        })
    }

    pub fn on_take_removed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(TakeId) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let TakeEvent::Removed(id) = event {
                callback(*id);
            }
        })
    }

    pub fn on_take_list_reset<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let TakeEvent::ListReset = event {
                callback();
            }
        })
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<TakeEvent>) {
        self.subscribers.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn emit(&self, event: TakeEvent) {
        self.subscribers.emit(&event);
    }
}
