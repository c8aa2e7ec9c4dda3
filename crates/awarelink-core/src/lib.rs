//! # awarelink-core
//!
//! Shared foundation for AwareLink: the identifiers handed out by the local
//! discovery transport, the in-band handshake protocol, and the link state
//! machine that decides which device opens a listening port and when the
//! data path counts as connected.
//!
//! This crate performs no I/O and spawns no tasks.  Every platform callback
//! is turned into a [`LinkEvent`] and fed to [`LinkState::apply`], which
//! returns the next state together with a list of [`Effect`]s for the
//! runtime to carry out.
//!
//! # Architecture overview (for beginners)
//!
//! Two nearby devices each run the same code.  One *publishes* a named
//! service, the other *subscribes* to it.  When the subscriber finds the
//! publisher it sends `INIT_CONNECT`; the publisher opens a listening port,
//! asks the OS for a point-to-point network bound to that port, and answers
//! `COMPLETE_CONNECT`; the subscriber then asks the OS for the matching
//! client-side network.  Once the OS reports the network as available on
//! both sides, the link is up.
//!
//! - **`domain`** – identifiers (`SessionId`, `PeerHandle`, ...) and the data
//!   model (`ConnectionAttempt`, `ActiveLink`, `NetworkSpecifier`).
//! - **`protocol`** – the UTF-8 handshake messages exchanged over the
//!   discovery message channel.
//! - **`machine`** – the pure `(state, event) -> (state, effects)` function.

pub mod domain;
pub mod machine;
pub mod protocol;

pub use domain::link::{
    ActiveLink, CapabilityInfo, ConnectionAttempt, NegotiationMode, NetworkSpecifier,
};
pub use domain::peer::{AttachmentId, AttemptId, DiscoveryRole, NetworkId, PeerHandle, SessionId};
pub use machine::{
    Effect, HandshakePhase, LinkCommand, LinkError, LinkEvent, LinkState, MachineSettings,
    Notification, Transition,
};
pub use protocol::messages::{HandshakeMessage, MessageId, ProtocolError};
