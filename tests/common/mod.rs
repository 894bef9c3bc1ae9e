//! Common test infrastructure
//!
//! Provides a scripted in-memory backend and fixtures for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{ScriptedDevice, StepScript};
//!
//! #[tokio::test]
//! async fn test_ingest() {
//!     let (device, capability) = ScriptedDevice::with_takes(8).await;
//!     let handle = capability.create_process(7, ProcessConfiguration::INGEST).unwrap();
//! }
//! ```

mod constants;
mod fixtures;
mod scripted_device;

// Public API - this is what tests import
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{create_test_archive, finish_channel, take_fixtures};
pub use scripted_device::{ScriptedDevice, StepScript};
