//! In-band handshake protocol carried over the discovery message channel.

pub mod messages;

pub use messages::{HandshakeMessage, MessageId, ProtocolError};
