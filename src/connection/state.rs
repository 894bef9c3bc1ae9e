//! Connection status of a device, with change notification.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::notify::{SubscriptionId, Subscribers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnecting => "DISCONNECTING",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Timed out after {0:?} waiting for status {1}")]
    Timeout(Duration, ConnectionStatus),

    #[error("Device identifier cannot be changed")]
    IdentifierLocked,

    #[error("Connection failed: {0}")]
    Failed(String),
}

/// Current status of one device plus the subscribers watching it.
///
/// Transitions are driven by the device backend through
/// [`set_status`](Self::set_status). Every transition reaches every
/// subscriber, in order; nothing is coalesced.
pub struct ConnectionState {
    status: Mutex<ConnectionStatus>,
    subscribers: Subscribers<ConnectionStatus>,
    watch_tx: watch::Sender<ConnectionStatus>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            status: Mutex::new(ConnectionStatus::Disconnected),
            subscribers: Subscribers::new(),
            watch_tx,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Move to `status` and notify subscribers. Setting the current status
    /// again is not a transition and notifies nobody.
    pub fn set_status(&self, status: ConnectionStatus) {
        {
            let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
            if *current == status {
                debug!("Connection status already {}", status);
                return;
            }
            info!("Connection status {} -> {}", *current, status);
            *current = status;
            // Sent under the lock so watchers observe transitions in order.
            self.watch_tx.send_replace(status);
        }
        self.subscribers.emit(&status);
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn subscribe_channel(
        &self,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ConnectionStatus>) {
        self.subscribers.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Wait until the status equals `target`, up to `timeout`.
    pub async fn wait_for(
        &self,
        target: ConnectionStatus,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let mut rx = self.watch_tx.subscribe();
        let outcome = tokio::time::timeout(timeout, rx.wait_for(|status| *status == target))
            .await
            .map(|seen| seen.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            // The sender lives in `self`, so the channel cannot close while we borrow it.
            Ok(Err(_)) => Err(ConnectionError::Failed("status channel closed".to_string())),
            Err(_) => Err(ConnectionError::Timeout(timeout, target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_disconnected() {
        let state = ConnectionState::new();
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(!state.is_connected());
    }

    #[test]
    fn test_subscriber_sees_every_transition_in_order() {
        let state = ConnectionState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.subscribe(move |status| sink.lock().unwrap().push(*status));

        state.set_status(ConnectionStatus::Connecting);
        state.set_status(ConnectionStatus::Connected);
        state.set_status(ConnectionStatus::Connected);
        state.set_status(ConnectionStatus::Disconnecting);
        state.set_status(ConnectionStatus::Disconnected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnecting,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_transition() {
        let state = Arc::new(ConnectionState::new());
        let driver = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            driver.set_status(ConnectionStatus::Connecting);
            driver.set_status(ConnectionStatus::Connected);
        });

        state
            .wait_for(ConnectionStatus::Connected, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let state = ConnectionState::new();
        let err = state
            .wait_for(ConnectionStatus::Connected, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Timeout(_, ConnectionStatus::Connected)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_current_status_returns_immediately() {
        let state = ConnectionState::new();
        state
            .wait_for(ConnectionStatus::Disconnected, Duration::from_millis(1))
            .await
            .unwrap();
    }
}
