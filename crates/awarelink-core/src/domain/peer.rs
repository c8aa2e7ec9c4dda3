//! Opaque identifiers handed out by the discovery transport and network stack.
//!
//! # Why are peer handles tied to a session? (for beginners)
//!
//! The discovery platform numbers the peers it reports *per discovery
//! session*.  The same remote device can show up with a different handle in
//! the next session, and an old handle may even be reused for a different
//! device.  [`PeerHandle`] therefore records the [`SessionId`] that produced
//! it, and the state machine refuses to act on a handle whose session is no
//! longer the active one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one attachment to the discovery transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub u64);

/// Identifies one publish or subscribe discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// Identifies a network granted by the OS network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

/// Identifies one connection attempt.  Used to discard late timer and
/// listener events that belong to an attempt that has already ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

/// A discovered counterpart, valid only within the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle {
    /// The local discovery session that reported this peer.
    pub session: SessionId,
    /// Transport-assigned instance number of the remote peer.
    pub instance: u64,
}

impl PeerHandle {
    pub fn new(session: SessionId, instance: u64) -> Self {
        Self { session, instance }
    }

    /// Returns `true` if this handle was produced by `session`.
    pub fn belongs_to(&self, session: SessionId) -> bool {
        self.session == session
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network#{}", self.0)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt#{}", self.0)
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}@{}", self.instance, self.session)
    }
}

/// Which discovery role, if any, is currently active.
///
/// Publisher and subscriber sessions are mutually exclusive, so a single
/// tagged value replaces the pair of nullable session slots a callback-based
/// design would need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryRole {
    #[default]
    None,
    /// Advertising the service; waits for an incoming `INIT_CONNECT`.
    Publishing(SessionId),
    /// Searching for the service; initiates the handshake on discovery.
    Subscribing(SessionId),
}

impl DiscoveryRole {
    /// The session backing the active role.
    pub fn session(&self) -> Option<SessionId> {
        match *self {
            DiscoveryRole::None => None,
            DiscoveryRole::Publishing(s) | DiscoveryRole::Subscribing(s) => Some(s),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, DiscoveryRole::None)
    }

    pub fn is_publishing(&self) -> bool {
        matches!(self, DiscoveryRole::Publishing(_))
    }

    pub fn is_subscribing(&self) -> bool {
        matches!(self, DiscoveryRole::Subscribing(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
