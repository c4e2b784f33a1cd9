//! Fan-out of roster snapshots to every live connection.

use log::debug;
use shared::{PresenceEntry, ServerMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Outbound handle for one connection: the queue drained by its writer
/// task, plus the serial distinguishing it from an earlier connection
/// that authenticated as the same identity.
#[derive(Debug)]
struct Recipient {
    serial: u64,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

/// The outbound connection table. Owned by the presence loop alongside
/// the registry; the set of recipients is the definition of "currently
/// connected".
///
/// Delivery is best-effort per recipient: sends are channel enqueues, so
/// a slow or dead client never delays the others, and a failed enqueue
/// just means that connection is already tearing down.
#[derive(Debug, Default)]
pub struct Broadcaster {
    recipients: HashMap<String, Recipient>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            recipients: HashMap::new(),
        }
    }

    /// Registers a connection's outbound queue. If the same identity was
    /// already registered, the previous sender is displaced and returned
    /// so the caller can tell that connection why it is being dropped.
    pub fn register(
        &mut self,
        id: &str,
        serial: u64,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<mpsc::UnboundedSender<ServerMessage>> {
        self.recipients
            .insert(id.to_string(), Recipient { serial, sender })
            .map(|displaced| displaced.sender)
    }

    /// Removes a connection, but only if it is still the one registered
    /// under this id. A close signal from a displaced connection carries
    /// a stale serial and must not tear down its successor.
    pub fn unregister(&mut self, id: &str, serial: u64) -> bool {
        match self.recipients.get(id) {
            Some(recipient) if recipient.serial == serial => {
                self.recipients.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Enqueues the full snapshot to every connection, including the one
    /// whose event produced it.
    pub fn broadcast(&self, users: HashMap<String, PresenceEntry>) {
        let message = ServerMessage::Locations { users };

        for (id, recipient) in &self.recipients {
            if recipient.sender.send(message.clone()).is_err() {
                debug!("Skipping broadcast to {}: connection closing", id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}
