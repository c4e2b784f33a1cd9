//! The presence loop: single owner of the registry and the connection
//! table, fed by a command channel.
//!
//! Connection tasks never touch shared state directly. They translate
//! inbound events into commands; the loop applies each command and, when
//! it changed the roster, takes a snapshot and enqueues it to every
//! connection within the same iteration. That makes each broadcast a
//! discrete roster state and delivers broadcasts in mutation order, while
//! channel FIFO preserves the order of any one connection's own events.

use crate::broadcast::Broadcaster;
use crate::registry::PresenceRegistry;
use log::{debug, info, warn};
use shared::ServerMessage;
use tokio::sync::mpsc;

/// Mutation requests sent from connection tasks to the presence loop.
#[derive(Debug)]
pub enum PresenceCommand {
    /// A connection passed verification; add it to the roster.
    Join {
        id: String,
        username: String,
        serial: u64,
        sender: mpsc::UnboundedSender<ServerMessage>,
    },
    /// A connection reported new coordinates.
    UpdateLocation {
        id: String,
        latitude: f64,
        longitude: f64,
    },
    /// Reverse geocoding finished for the given coordinates.
    SetAddress {
        id: String,
        latitude: f64,
        longitude: f64,
        address: String,
    },
    /// A connection closed.
    Leave { id: String, serial: u64 },
}

/// Applies commands in arrival order until every command sender is gone.
pub async fn run_presence_loop(mut commands: mpsc::UnboundedReceiver<PresenceCommand>) {
    let mut registry = PresenceRegistry::new();
    let mut broadcaster = Broadcaster::new();

    while let Some(command) = commands.recv().await {
        match command {
            PresenceCommand::Join {
                id,
                username,
                serial,
                sender,
            } => {
                if let Some(displaced) = broadcaster.register(&id, serial, sender) {
                    info!("{} signed in again; displacing the previous connection", id);
                    let _ = displaced.send(ServerMessage::Disconnected {
                        reason: "superseded by a newer connection".to_string(),
                    });
                }
                registry.insert(&id, &username);
                broadcaster.broadcast(registry.snapshot());
            }

            PresenceCommand::UpdateLocation {
                id,
                latitude,
                longitude,
            } => {
                if registry.update_position(&id, latitude, longitude) {
                    broadcaster.broadcast(registry.snapshot());
                } else {
                    // The update raced a disconnect; the entry is gone.
                    warn!("Ignoring location update for unregistered {}", id);
                }
            }

            PresenceCommand::SetAddress {
                id,
                latitude,
                longitude,
                address,
            } => {
                if registry.set_address(&id, latitude, longitude, address) {
                    broadcaster.broadcast(registry.snapshot());
                } else {
                    debug!("Discarding stale address for {}", id);
                }
            }

            PresenceCommand::Leave { id, serial } => {
                if broadcaster.unregister(&id, serial) && registry.remove(&id) {
                    broadcaster.broadcast(registry.snapshot());
                }
            }
        }
    }

    debug!("Presence loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PresenceEntry;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);
    const SILENCE: Duration = Duration::from_millis(200);

    struct Harness {
        commands: mpsc::UnboundedSender<PresenceCommand>,
    }

    struct FakeConnection {
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    impl Harness {
        fn start() -> Self {
            let (commands, command_rx) = mpsc::unbounded_channel();
            tokio::spawn(run_presence_loop(command_rx));
            Self { commands }
        }

        fn join(&self, id: &str, username: &str, serial: u64) -> FakeConnection {
            let (tx, rx) = mpsc::unbounded_channel();
            self.commands
                .send(PresenceCommand::Join {
                    id: id.to_string(),
                    username: username.to_string(),
                    serial,
                    sender: tx,
                })
                .unwrap();
            FakeConnection { rx }
        }

        fn update(&self, id: &str, latitude: f64, longitude: f64) {
            self.commands
                .send(PresenceCommand::UpdateLocation {
                    id: id.to_string(),
                    latitude,
                    longitude,
                })
                .unwrap();
        }

        fn set_address(&self, id: &str, latitude: f64, longitude: f64, address: &str) {
            self.commands
                .send(PresenceCommand::SetAddress {
                    id: id.to_string(),
                    latitude,
                    longitude,
                    address: address.to_string(),
                })
                .unwrap();
        }

        fn leave(&self, id: &str, serial: u64) {
            self.commands
                .send(PresenceCommand::Leave {
                    id: id.to_string(),
                    serial,
                })
                .unwrap();
        }
    }

    impl FakeConnection {
        async fn recv(&mut self) -> ServerMessage {
            timeout(RECV_TIMEOUT, self.rx.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("channel closed")
        }

        async fn recv_locations(&mut self) -> HashMap<String, PresenceEntry> {
            match self.recv().await {
                ServerMessage::Locations { users } => users,
                other => panic!("Expected a locations message, got {:?}", other),
            }
        }

        async fn expect_silence(&mut self) {
            if let Ok(message) = timeout(SILENCE, self.rx.recv()).await {
                panic!("Expected no message, got {:?}", message);
            }
        }
    }

    #[tokio::test]
    async fn test_join_broadcasts_roster() {
        let harness = Harness::start();
        let mut conn = harness.join("u1", "Alice", 1);

        let users = conn.recv_locations().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users["u1"].username, "Alice");
        assert_eq!(users["u1"].latitude, 0.0);
        assert_eq!(users["u1"].longitude, 0.0);
    }

    #[tokio::test]
    async fn test_update_broadcasts_new_coordinates() {
        let harness = Harness::start();
        let mut conn = harness.join("u1", "Alice", 1);
        conn.recv_locations().await;

        harness.update("u1", 40.0, -74.0);

        let users = conn.recv_locations().await;
        assert_eq!(users["u1"].latitude, 40.0);
        assert_eq!(users["u1"].longitude, -74.0);
    }

    #[tokio::test]
    async fn test_updates_applied_in_order() {
        let harness = Harness::start();
        let mut conn = harness.join("u1", "Alice", 1);
        conn.recv_locations().await;

        harness.update("u1", 40.0, -74.0);
        harness.update("u1", 41.0, -75.0);

        let first = conn.recv_locations().await;
        assert_eq!(first["u1"].latitude, 40.0);

        let second = conn.recv_locations().await;
        assert_eq!(second["u1"].latitude, 41.0);
    }

    #[tokio::test]
    async fn test_leave_broadcasts_removal_once() {
        let harness = Harness::start();
        let mut alice = harness.join("u1", "Alice", 1);
        alice.recv_locations().await;
        let mut bob = harness.join("u2", "Bob", 2);
        alice.recv_locations().await;
        bob.recv_locations().await;

        harness.leave("u2", 2);

        let users = alice.recv_locations().await;
        assert_eq!(users.len(), 1);
        assert!(users.contains_key("u1"));

        // A duplicate close signal changes nothing and stays silent.
        harness.leave("u2", 2);
        alice.expect_silence().await;
    }

    #[tokio::test]
    async fn test_update_after_leave_is_dropped() {
        let harness = Harness::start();
        let mut alice = harness.join("u1", "Alice", 1);
        alice.recv_locations().await;
        let mut bob = harness.join("u2", "Bob", 2);
        alice.recv_locations().await;
        bob.recv_locations().await;

        harness.leave("u2", 2);
        alice.recv_locations().await;

        harness.update("u2", 40.0, -74.0);
        alice.expect_silence().await;
    }

    #[tokio::test]
    async fn test_address_arrives_as_later_broadcast() {
        let harness = Harness::start();
        let mut conn = harness.join("u1", "Alice", 1);
        conn.recv_locations().await;

        harness.update("u1", 40.0, -74.0);
        let coords_only = conn.recv_locations().await;
        assert!(coords_only["u1"].address.is_none());

        harness.set_address("u1", 40.0, -74.0, "Newark, NJ");
        let enriched = conn.recv_locations().await;
        assert_eq!(enriched["u1"].address.as_deref(), Some("Newark, NJ"));
        assert_eq!(enriched["u1"].latitude, 40.0);
    }

    #[tokio::test]
    async fn test_stale_address_never_broadcast() {
        let harness = Harness::start();
        let mut conn = harness.join("u1", "Alice", 1);
        conn.recv_locations().await;

        harness.update("u1", 40.0, -74.0);
        conn.recv_locations().await;
        harness.update("u1", 41.0, -75.0);
        conn.recv_locations().await;

        // The lookup for the first position resolves after the move.
        harness.set_address("u1", 40.0, -74.0, "stale address");
        conn.expect_silence().await;
    }

    #[tokio::test]
    async fn test_duplicate_identity_displaces_old_connection() {
        let harness = Harness::start();
        let mut first = harness.join("u1", "Alice", 1);
        first.recv_locations().await;

        let mut second = harness.join("u1", "Alice", 2);

        match first.recv().await {
            ServerMessage::Disconnected { reason } => {
                assert!(reason.contains("superseded"));
            }
            other => panic!("Expected a disconnect notice, got {:?}", other),
        }

        let users = second.recv_locations().await;
        assert_eq!(users.len(), 1);

        // The displaced connection's close must not remove the new entry.
        harness.leave("u1", 1);
        second.expect_silence().await;

        harness.update("u1", 40.0, -74.0);
        let users = second.recv_locations().await;
        assert_eq!(users["u1"].latitude, 40.0);
    }
}
