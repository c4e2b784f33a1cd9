//! The presence registry: authoritative mapping from connection identity
//! to last-known state.
//!
//! The registry is owned exclusively by the presence loop and mutated only
//! through the methods here, so every operation (and every snapshot) is a
//! discrete point in the roster's history. Unknown ids are treated as
//! no-ops rather than errors; it is the lifecycle layer's job to only
//! report updates for admitted, still-connected identities.

use log::info;
use shared::PresenceEntry;
use std::collections::HashMap;

/// One entry per currently-open, successfully-admitted connection.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Creates (or replaces) the entry for a newly admitted connection.
    /// New entries sit at the origin with no address until the client
    /// reports a position.
    pub fn insert(&mut self, id: &str, username: &str) {
        info!("Tracking presence for {} ({})", id, username);
        self.entries
            .insert(id.to_string(), PresenceEntry::new(username));
    }

    /// Applies a position report. Any resolved address is cleared, since
    /// it described the previous coordinates. Returns false if the id is
    /// not registered.
    pub fn update_position(&mut self, id: &str, latitude: f64, longitude: f64) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.latitude = latitude;
                entry.longitude = longitude;
                entry.address = None;
                true
            }
            None => false,
        }
    }

    /// Attaches a resolved address, but only while the entry still holds
    /// the exact coordinates that were geocoded. A lookup that resolves
    /// after the client moved on, or after the connection closed, is
    /// discarded.
    pub fn set_address(
        &mut self,
        id: &str,
        latitude: f64,
        longitude: f64,
        address: String,
    ) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.latitude == latitude && entry.longitude == longitude => {
                entry.address = Some(address);
                true
            }
            _ => false,
        }
    }

    /// Removes the entry for a closed connection. Returns true only if an
    /// entry was actually removed, so duplicate close signals do not
    /// trigger duplicate broadcasts.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.entries.remove(id).is_some() {
            info!("Dropped presence for {}", id);
            true
        } else {
            false
        }
    }

    /// A consistent copy of the full roster at this instant.
    pub fn snapshot(&self) -> HashMap<String, PresenceEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
