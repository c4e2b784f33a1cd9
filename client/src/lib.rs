//! # Presence Client Library
//!
//! A headless reference client for the presence server. It connects over
//! TCP, authenticates with a bearer token obtained from the external
//! identity service, reports a position on a fixed cadence, and prints the
//! roster snapshots the server pushes back.
//!
//! The map UI of the full product lives elsewhere; this client exists to
//! exercise the protocol end to end from a terminal, for demos and for
//! the integration tests.
//!
//! ## Module Organization
//!
//! - `network`: connection handling, handshake, and the send/receive loop
//! - `roster`: terminal formatting of received snapshots

pub mod network;
pub mod roster;
