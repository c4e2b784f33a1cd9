//! Terminal rendering of received roster snapshots.

use shared::PresenceEntry;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Formats a snapshot as one line per user, sorted by id so successive
/// snapshots are easy to compare by eye.
pub fn format_roster(users: &HashMap<String, PresenceEntry>, own_id: &str) -> String {
    let mut ids: Vec<&String> = users.keys().collect();
    ids.sort();

    let mut out = String::new();
    for id in ids {
        let entry = &users[id];
        let marker = if id == own_id { " (you)" } else { "" };

        let _ = write!(
            out,
            "  {}{}: ({:.4}, {:.4})",
            entry.username, marker, entry.latitude, entry.longitude
        );
        if let Some(address) = &entry.address {
            let _ = write!(out, " [{}]", address);
        }
        out.push('\n');
    }
    out
}
