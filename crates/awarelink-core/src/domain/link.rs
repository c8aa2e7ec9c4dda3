//! Connection data model: the in-flight attempt and the resolved data path.
//!
//! ```text
//! PeerDiscovered / INIT_CONNECT        NetworkAvailable
//!        │                                   │
//!        ▼                                   ▼
//!  ConnectionAttempt  ───────────────►  ActiveLink { connected: true }
//!        │                                   │
//!   timeout / unavailable              NetworkLost
//!        ▼                                   ▼
//!    (discarded)                         (discarded)
//! ```

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use super::peer::{AttemptId, NetworkId, PeerHandle, SessionId};

/// Which side of the data path this device takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationMode {
    /// The handshake initiator; connects to the responder's port.
    Client,
    /// The `INIT_CONNECT` recipient.  `port` is `None` until the
    /// listening socket has been bound.
    Server { port: Option<u16> },
}

/// Transient record of a negotiation that has not resolved yet.
///
/// Its existence *is* the `isEstablishing` flag: at most one attempt is in
/// flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub id: AttemptId,
    pub peer: PeerHandle,
    pub mode: NegotiationMode,
}

/// The resolved point-to-point data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLink {
    pub network: NetworkId,
    pub peer_addr: Option<Ipv6Addr>,
    pub peer_port: Option<u16>,
    pub connected: bool,
}

impl ActiveLink {
    /// A link whose network is known but not yet reported available.
    pub fn pending(network: NetworkId) -> Self {
        Self {
            network,
            peer_addr: None,
            peer_port: None,
            connected: false,
        }
    }
}

/// Transport-specific payload delivered with a capability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityInfo {
    pub peer_ipv6: Ipv6Addr,
    /// The server's listening port; absent when the peer is the client.
    pub port: Option<u16>,
}

/// Everything the OS needs to bring up the data path to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpecifier {
    pub session: SessionId,
    pub peer: PeerHandle,
    pub passphrase: String,
    /// Listening port advertised in server mode.
    pub port: Option<u16>,
}

impl NetworkSpecifier {
    /// Specifier for the initiator side: no port to advertise.
    pub fn client(session: SessionId, peer: PeerHandle, passphrase: impl Into<String>) -> Self {
        Self {
            session,
            peer,
            passphrase: passphrase.into(),
            port: None,
        }
    }

    /// Specifier for the responder side, bound to its listening port.
    pub fn server(
        session: SessionId,
        peer: PeerHandle,
        passphrase: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            session,
            peer,
            passphrase: passphrase.into(),
            port: Some(port),
        }
    }
}
