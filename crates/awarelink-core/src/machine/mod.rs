//! The link state machine: events in, effects out.
//!
//! # How the machine is driven (for beginners)
//!
//! Two independent callback sources feed the machine: the discovery
//! transport (attach results, session starts, discovered peers, messages)
//! and the OS network stack (available / capabilities / unavailable / lost).
//! Each callback becomes a [`LinkEvent`].  Caller requests (advertise,
//! subscribe, send, disconnect) become [`LinkCommand`]s.
//!
//! ```text
//!           LinkEvent / LinkCommand
//!                    │
//!                    ▼
//!   LinkState ── apply / execute ──► Transition { state, effects }
//!                                                  │
//!                                runtime performs each Effect in order
//! ```
//!
//! The machine never calls the platform directly, so every rule of the
//! handshake can be tested with plain values.

mod transition;

use std::time::Duration;

use thiserror::Error;

use crate::domain::link::{ActiveLink, CapabilityInfo, ConnectionAttempt, NetworkSpecifier};
use crate::domain::peer::{AttachmentId, AttemptId, DiscoveryRole, NetworkId, PeerHandle, SessionId};
use crate::protocol::messages::{HandshakeMessage, MessageId};

/// Errors surfaced by the link layer.
///
/// Only the first four are ever returned from a command; the others name the
/// conditions reported through notifications and logs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("required discovery permissions were not granted")]
    PermissionDenied,
    #[error("no attachment to the discovery transport")]
    NullSession,
    #[error("no active discovery session")]
    NoActiveSession,
    #[error("no peer to send to")]
    NoPeer,
    #[error("network negotiation failed")]
    NetworkUnavailable,
    #[error("network link lost")]
    NetworkLost,
    #[error("transport error: {0}")]
    Transport(String),
}

impl LinkError {
    /// Stable code used by the method-channel bridge.
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::PermissionDenied => "PERMISSION_DENIED",
            LinkError::NullSession => "NULL_SESSION",
            LinkError::NoActiveSession => "NO_ACTIVE_SESSION",
            LinkError::NoPeer => "NO_PEER",
            LinkError::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            LinkError::NetworkLost => "NETWORK_LOST",
            LinkError::Transport(_) => "TRANSPORT_ERROR",
        }
    }
}

/// Settings the machine needs to build requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSettings {
    /// Service name used for both publishing and subscribing.
    pub service_name: String,
    /// Pre-shared credential placed in every network specifier.
    pub passphrase: String,
    /// How long an attempt may stay unresolved.  `None` waits forever.
    pub negotiation_timeout: Option<Duration>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            service_name: "COMMANDER_SERVICE".to_string(),
            passphrase: "somePassword".to_string(),
            negotiation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Handshake progress.  `Idle` is reachable from every phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HandshakePhase {
    #[default]
    Idle,
    AwaitingPeer,
    Negotiating,
    Connected,
}

/// A platform callback, translated into a value.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Attached(AttachmentId),
    AttachFailed,
    AttachmentTerminated,
    /// The discovery subsystem toggled availability.
    AvailabilityChanged { available: bool },
    PublishStarted(SessionId),
    SubscribeStarted(SessionId),
    DiscoveryConfigFailed,
    PeerDiscovered(PeerHandle),
    MessageReceived(PeerHandle, Vec<u8>),
    MessageSendFailed(MessageId),
    SessionTerminated(SessionId),
    ListenerOpened { attempt: AttemptId, port: u16 },
    ListenerFailed { attempt: AttemptId, reason: String },
    NetworkAvailable(NetworkId),
    CapabilitiesChanged(NetworkId, CapabilityInfo),
    NetworkUnavailable,
    NetworkLost(NetworkId),
    NegotiationTimedOut(AttemptId),
}

/// A request from the collaborator that issues commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Attach,
    Advertise,
    Subscribe,
    Send(String),
    Disconnect,
}

/// Push notification delivered to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Connect,
    Disconnect,
    Error(String),
    MessageReceived(String),
    MessageSendFailed,
}

/// Work the runtime must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Attach,
    CloseAttachment(AttachmentId),
    Publish(String),
    Subscribe(String),
    CloseSession(SessionId),
    SendMessage {
        session: SessionId,
        peer: PeerHandle,
        id: MessageId,
        message: HandshakeMessage,
    },
    /// Bind an ephemeral listening port for the given attempt.
    OpenListener(AttemptId),
    /// Close the listening socket bound on this port.
    CloseListener(u16),
    RequestNetwork(NetworkSpecifier),
    ReleaseNetwork,
    StartNegotiationTimer { attempt: AttemptId, after: Duration },
    /// Abort every task owned by the current attempt.
    CancelTasks,
    Notify(Notification),
}

/// Result of applying one event or command.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: LinkState,
    pub effects: Vec<Effect>,
}

/// The discovery role the caller asked for and the transport has not
/// confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestedRole {
    Publish,
    Subscribe,
}

/// Complete state of one device's link.
#[derive(Debug, Clone)]
pub struct LinkState {
    settings: MachineSettings,
    attachment: Option<AttachmentId>,
    requested: Option<RequestedRole>,
    role: DiscoveryRole,
    phase: HandshakePhase,
    attempt: Option<ConnectionAttempt>,
    peer: Option<PeerHandle>,
    link: Option<ActiveLink>,
    listener_port: Option<u16>,
    network_requested: bool,
    /// Network of the last link this device released itself; its late
    /// `NetworkLost` is not reported again.
    released_network: Option<NetworkId>,
    next_attempt: u64,
}

impl LinkState {
    pub fn new(settings: MachineSettings) -> Self {
        Self {
            settings,
            attachment: None,
            requested: None,
            role: DiscoveryRole::None,
            phase: HandshakePhase::Idle,
            attempt: None,
            peer: None,
            link: None,
            listener_port: None,
            network_requested: false,
            released_network: None,
            next_attempt: 0,
        }
    }

    pub fn attachment(&self) -> Option<AttachmentId> {
        self.attachment
    }

    pub fn role(&self) -> DiscoveryRole {
        self.role
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn attempt(&self) -> Option<&ConnectionAttempt> {
        self.attempt.as_ref()
    }

    /// `true` while a connection attempt is in flight.
    pub fn is_establishing(&self) -> bool {
        self.attempt.is_some()
    }

    pub fn peer(&self) -> Option<PeerHandle> {
        self.peer
    }

    pub fn link(&self) -> Option<&ActiveLink> {
        self.link.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some_and(|l| l.connected)
    }

    pub fn listener_port(&self) -> Option<u16> {
        self.listener_port
    }

    /// `true` while a network request is registered with the OS.
    pub fn network_requested(&self) -> bool {
        self.network_requested
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new(MachineSettings::default())
    }
}
