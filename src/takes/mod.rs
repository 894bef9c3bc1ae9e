//! Takes known to a device: metadata, the id registry, and change events.

mod catalog;
mod events;
mod models;
mod registry;

pub use catalog::TakeCatalog;
pub use events::{TakeEvent, TakeEvents};
pub use models::{TakeId, TakeInfo, TakeMetadata};
pub use registry::TakeRegistry;
