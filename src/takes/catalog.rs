//! Registry and events bundled together for device backends.

use tracing::debug;

use super::events::{TakeEvent, TakeEvents};
use super::models::{TakeId, TakeMetadata};
use super::registry::TakeRegistry;

/// The takes of one device plus the events describing their changes.
///
/// Backends mutate takes through the `*_take` methods so that every change
/// is announced to subscribers; the registry stays reachable for reads.
#[derive(Default)]
pub struct TakeCatalog {
    registry: TakeRegistry,
    events: TakeEvents,
}

impl TakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &TakeRegistry {
        &self.registry
    }

    pub fn events(&self) -> &TakeEvents {
        &self.events
    }

    pub fn add_take(&self, metadata: TakeMetadata) -> TakeId {
        let name = metadata.display_name();
        let id = self.registry.add(metadata);
        debug!("Added take {} ({})", id, name);
        self.events.emit(TakeEvent::Added(id));
        id
    }

    pub fn update_take(&self, id: TakeId, metadata: TakeMetadata) -> bool {
        let updated = self.registry.update(id, metadata);
        if updated {
            debug!("Updated take {}", id);
            self.events.emit(TakeEvent::Updated(id));
        }
        updated
    }

    pub fn remove_take(&self, id: TakeId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!("Removed take {}", id);
            self.events.emit(TakeEvent::Removed(id));
        }
        removed
    }

    /// Drop every take and announce a list reset.
    pub fn reset(&self) {
        self.registry.remove_all();
        debug!("Take list reset");
        self.events.emit(TakeEvent::ListReset);
    }

    /// Id of the first take matching `predicate`, lowest id first.
    pub fn find_take<P>(&self, predicate: P) -> Option<TakeId>
    where
        P: Fn(&TakeMetadata) -> bool,
    {
        self.registry
            .entries()
            .into_iter()
            .find(|(_, metadata)| predicate(metadata))
            .map(|(id, _)| id)
    }
}
