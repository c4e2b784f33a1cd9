//! # Presence Server Library
//!
//! This library implements the server side of the real-time location
//! tracker: authenticated clients report their position over a TCP
//! connection, and the server pushes the complete roster of everyone
//! online to every connection whenever anything changes.
//!
//! ## Core Responsibilities
//!
//! ### Admission Control
//! Every connection must open with a handshake carrying a bearer token
//! signed by the external identity service. Verification is fail-closed:
//! a connection that cannot prove an identity is refused before it can
//! touch any shared state.
//!
//! ### Presence Tracking
//! The server keeps exactly one in-memory entry per live connection with
//! the user's display name, last reported coordinates, and (when reverse
//! geocoding has caught up) a human-readable address. Nothing is
//! persisted; the roster always describes who is online right now.
//!
//! ### Snapshot Broadcasting
//! After every roster change the server serializes the full roster and
//! enqueues it to every connection. There is no diffing: a client that
//! misses a few snapshots converges again on the next one it receives.
//!
//! ## Architecture
//!
//! All mutation flows through a single presence loop that owns the
//! registry and the outbound connection table, fed by a command channel.
//! One task per connection parses inbound messages and turns them into
//! commands; a writer task per connection drains its outbound queue so a
//! slow client only ever stalls itself. Applying a command and
//! broadcasting the resulting snapshot happen in the same loop iteration,
//! so every snapshot a client sees corresponds to a real, discrete state
//! of the roster, delivered in mutation order.
//!
//! ## Module Organization
//!
//! - `auth`: bearer-token verification against the injected secret
//! - `registry`: the roster itself and its mutation rules
//! - `broadcast`: the outbound connection table and snapshot fan-out
//! - `presence`: the command channel and the loop that owns the state
//! - `connection`: per-connection lifecycle, from handshake to teardown
//! - `geocode`: best-effort reverse geocoding of reported coordinates
//! - `network`: the TCP listener wiring it all together

pub mod auth;
pub mod broadcast;
pub mod connection;
pub mod geocode;
pub mod network;
pub mod presence;
pub mod registry;
