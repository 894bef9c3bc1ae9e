//! Connection contract implemented by device backends.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use super::state::{ConnectionError, ConnectionState, ConnectionStatus};

/// Devices that must be connected before they can ingest.
///
/// `connect` and `disconnect` start the transition and return; progress is
/// published through [`connection_state`](Self::connection_state).
pub trait ConnectionCapability: Send + Sync {
    fn connection_state(&self) -> &ConnectionState;

    fn connect(&self);

    fn disconnect(&self);

    /// Whether the device's hardware identifier may be edited.
    fn can_set_identifier(&self) -> bool {
        false
    }
}

/// Start connecting and wait for `Connected`, giving up after `timeout`.
pub async fn connect_and_wait<D>(device: &D, timeout: Duration) -> Result<(), ConnectionError>
where
    D: ConnectionCapability + ?Sized,
{
    let state = device.connection_state();
    if state.is_connected() {
        return Ok(());
    }

    device.connect();
    match state.wait_for(ConnectionStatus::Connected, timeout).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Device did not connect: {}", e);
            Err(e)
        }
    }
}

/// Replace the identifier in `slot`, if the device allows it.
pub fn update_identifier<D>(
    device: &D,
    slot: &Mutex<String>,
    identifier: &str,
) -> Result<(), ConnectionError>
where
    D: ConnectionCapability + ?Sized,
{
    if !device.can_set_identifier() {
        return Err(ConnectionError::IdentifierLocked);
    }
    let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());
    info!("Device identifier '{}' -> '{}'", *current, identifier);
    *current = identifier.to_string();
    Ok(())
}
