//! Domain layer: identifiers and the connection data model.
//!
//! Nothing in here knows about sockets, threads or the discovery platform.
//! The types are plain values that the state machine copies and compares.

pub mod link;
pub mod peer;
