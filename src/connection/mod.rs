//! Device connection status and the contract for connecting devices.
//!
//! Status flow: DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTING -> DISCONNECTED.
//! There is no built-in timeout; [`connect_and_wait`] layers one on top.

mod capability;
mod state;

pub use capability::{connect_and_wait, update_identifier, ConnectionCapability};
pub use state::{ConnectionError, ConnectionState, ConnectionStatus};
