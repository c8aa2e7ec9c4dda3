//! Port traits for the platform collaborators.
//!
//! The discovery transport and the network stack are callback driven: calls
//! on these traits return immediately, and the outcome (session started,
//! network available, ...) comes back later as a [`LinkEvent`] pushed
//! through the [`EventSender`] the adapter was built with.
//!
//! ```text
//!   LinkController ──call──► DiscoveryTransport / NetworkStack
//!         ▲                              │
//!         │                        platform thread
//!   EventReceiver ◄──LinkEvent── EventSender
//! ```

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use awarelink_core::{
    AttachmentId, LinkEvent, MessageId, NetworkSpecifier, Notification, PeerHandle, SessionId,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Local discovery transport (publish / subscribe / in-band messages).
#[cfg_attr(test, mockall::automock)]
pub trait DiscoveryTransport: Send + Sync {
    /// Starts attaching.  Reports `Attached` or `AttachFailed`.
    fn attach(&self);

    fn close_attachment(&self, attachment: AttachmentId);

    /// Reports `PublishStarted` or `DiscoveryConfigFailed`.
    fn publish(&self, service: &str);

    /// Reports `SubscribeStarted` or `DiscoveryConfigFailed`, then
    /// `PeerDiscovered` for every matching publisher.
    fn subscribe(&self, service: &str);

    /// Reports `MessageSendFailed(id)` if the message cannot be delivered.
    fn send_message(&self, session: SessionId, peer: PeerHandle, id: MessageId, bytes: &[u8]);

    fn close_session(&self, session: SessionId);

    fn is_available(&self) -> bool;
}

/// OS network stack that brings up the point-to-point data path.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkStack: Send + Sync {
    /// Reports `NetworkAvailable` + `CapabilitiesChanged`, or
    /// `NetworkUnavailable`.
    fn request_network(&self, spec: &NetworkSpecifier);

    /// Withdraws the outstanding request.  Safe to call with none registered.
    fn release_request(&self);
}

/// Runtime permission check (fine location and nearby-devices access).
#[cfg_attr(test, mockall::automock)]
pub trait PermissionChecker: Send + Sync {
    fn granted(&self) -> bool;
}

/// Listening socket for the server side of the data path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    /// Binds a listening socket and returns its port.
    async fn open(&self) -> io::Result<u16>;

    /// Closes the socket that [`open`](Self::open) bound on `port`.
    ///
    /// Other sockets stay open; closing a port that is not bound does nothing.
    fn close(&self, port: u16);
}

/// Receives the notifications produced by the link.
#[cfg_attr(test, mockall::automock)]
pub trait LinkObserver: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl LinkObserver for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            debug!("notification receiver dropped");
        }
    }
}

/// The set of ports one link runs against.
#[derive(Clone)]
pub struct LinkPorts {
    pub discovery: Arc<dyn DiscoveryTransport>,
    pub network: Arc<dyn NetworkStack>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub listener: Arc<dyn ListenerFactory>,
}

// ── Event ingress ─────────────────────────────────────────────────────────────

/// Receiving half of the event channel, drained by the link runtime.
pub type EventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Cloneable handle adapters use to report platform callbacks.
///
/// Sending never blocks, so it is safe from any thread, including inside
/// a platform callback.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventSender {
    pub fn send(&self, event: LinkEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("link runtime stopped; dropping {:?}", e.0);
        }
    }
}

/// Creates a connected event sender / receiver pair.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
