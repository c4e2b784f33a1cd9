use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default TCP port, carried over from the original deployment.
pub const DEFAULT_PORT: u16 = 3001;
/// How long the server waits for the handshake line before refusing a
/// connection.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

pub const LATITUDE_MIN: f64 = -90.0;
pub const LATITUDE_MAX: f64 = 90.0;
pub const LONGITUDE_MIN: f64 = -180.0;
pub const LONGITUDE_MAX: f64 = 180.0;

/// Messages sent from client to server. Encoded as one JSON object per
/// line, tagged by the `type` field.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Handshake. Must be the first message on a new connection; the token
    /// comes from the external identity service.
    Connect { token: String },
    /// A new position report in WGS-84 degrees.
    UpdateLocation { latitude: f64, longitude: f64 },
    /// Polite close; dropping the connection works too.
    Disconnect,
}

/// Messages sent from server to client.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Handshake accepted; echoes the verified identity.
    Connected { id: String, username: String },
    /// The full presence roster, keyed by connection id. Sent to every
    /// connection whenever the roster changes.
    Locations { users: HashMap<String, PresenceEntry> },
    /// Handshake refused, or this connection was displaced.
    Disconnected { reason: String },
}

/// Last-known state for one connected user.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PresenceEntry {
    pub username: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Resolved street address for the current coordinates, when reverse
    /// geocoding has caught up. Omitted from the wire when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl PresenceEntry {
    /// A fresh entry for a newly admitted user, parked at the origin until
    /// their first position report.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            latitude: 0.0,
            longitude: 0.0,
            address: None,
        }
    }
}

/// Checks that a reported position is a real point on the globe: both
/// values finite and within WGS-84 range.
pub fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (LATITUDE_MIN..=LATITUDE_MAX).contains(&latitude)
        && (LONGITUDE_MIN..=LONGITUDE_MAX).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults() {
        let entry = PresenceEntry::new("Alice");
        assert_eq!(entry.username, "Alice");
        assert_eq!(entry.latitude, 0.0);
        assert_eq!(entry.longitude, 0.0);
        assert!(entry.address.is_none());
    }

    #[test]
    fn test_update_location_wire_format() {
        let message = ClientMessage::UpdateLocation {
            latitude: 40.0,
            longitude: -74.0,
        };

        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"type":"updateLocation","latitude":40.0,"longitude":-74.0}"#
        );
    }

    #[test]
    fn test_connect_wire_format() {
        let json = r#"{"type":"connect","token":"abc.def.ghi"}"#;

        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::Connect { token } => assert_eq!(token, "abc.def.ghi"),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_locations_omits_missing_address() {
        let mut users = HashMap::new();
        users.insert("u1".to_string(), PresenceEntry::new("Alice"));

        let json = serde_json::to_string(&ServerMessage::Locations { users }).unwrap();
        assert_eq!(
            json,
            r#"{"type":"locations","users":{"u1":{"username":"Alice","latitude":0.0,"longitude":0.0}}}"#
        );
    }

    #[test]
    fn test_locations_includes_resolved_address() {
        let mut users = HashMap::new();
        users.insert(
            "u1".to_string(),
            PresenceEntry {
                username: "Alice".to_string(),
                latitude: 40.0,
                longitude: -74.0,
                address: Some("New Jersey, USA".to_string()),
            },
        );

        let json = serde_json::to_string(&ServerMessage::Locations { users }).unwrap();
        assert!(json.contains(r#""address":"New Jersey, USA""#));

        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerMessage::Locations { users } => {
                assert_eq!(users["u1"].address.as_deref(), Some("New Jersey, USA"));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_non_numeric_coordinates_fail_to_parse() {
        let json = r#"{"type":"updateLocation","latitude":"bad","longitude":-74.0}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());

        let json = r#"{"type":"updateLocation","latitude":40.0}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_unknown_message_type_fails_to_parse() {
        let json = r#"{"type":"teleport","latitude":40.0,"longitude":-74.0}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        // Older clients geocoded on their own and attached the result.
        let json =
            r#"{"type":"updateLocation","latitude":40.0,"longitude":-74.0,"address":"ignored"}"#;

        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::UpdateLocation {
                latitude,
                longitude,
            } => {
                assert_eq!(latitude, 40.0);
                assert_eq!(longitude, -74.0);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_valid_coordinates_accepts_range() {
        assert!(valid_coordinates(0.0, 0.0));
        assert!(valid_coordinates(40.0, -74.0));
        assert!(valid_coordinates(LATITUDE_MIN, LONGITUDE_MIN));
        assert!(valid_coordinates(LATITUDE_MAX, LONGITUDE_MAX));
    }

    #[test]
    fn test_valid_coordinates_rejects_out_of_range() {
        assert!(!valid_coordinates(90.5, 0.0));
        assert!(!valid_coordinates(-91.0, 0.0));
        assert!(!valid_coordinates(0.0, 180.5));
        assert!(!valid_coordinates(0.0, -181.0));
    }

    #[test]
    fn test_valid_coordinates_rejects_non_finite() {
        assert!(!valid_coordinates(f64::NAN, 0.0));
        assert!(!valid_coordinates(0.0, f64::NAN));
        assert!(!valid_coordinates(f64::INFINITY, 0.0));
        assert!(!valid_coordinates(0.0, f64::NEG_INFINITY));
    }

    #[test]
    fn test_disconnect_wire_format() {
        let json = serde_json::to_string(&ClientMessage::Disconnect).unwrap();
        assert_eq!(json, r#"{"type":"disconnect"}"#);
    }
}
