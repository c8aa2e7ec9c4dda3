//! The link runtime: one Tokio task per device.
//!
//! # Why a single task? (for beginners)
//!
//! Platform callbacks, caller commands and finished timers can all arrive at
//! the same moment from different threads.  Rather than guarding the link
//! state with locks, everything is funnelled into one task that owns the
//! [`LinkController`] and handles one input at a time:
//!
//! ```text
//!   LinkHandle ──Request──┐
//!                          │
//!   EventSender ─LinkEvent─┼──► select! ──► LinkController ──► ports
//!                          │                      │
//!   JoinSet task ─LinkEvent┘                      └──Notification──► mpsc
//! ```
//!
//! Each request carries a `oneshot` sender for its reply, so `LinkHandle`
//! methods read like ordinary async calls.

use std::net::Ipv6Addr;
use std::sync::Arc;

use awarelink_core::{
    DiscoveryRole, HandshakePhase, LinkError, LinkEvent, MachineSettings, Notification,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::application::lifecycle::LinkController;
use crate::application::ports::{EventReceiver, LinkPorts};

/// Capacity of the command channel between handles and the runtime task.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Errors returned by [`LinkHandle`] methods.
#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Link(#[from] LinkError),
    /// The runtime task has exited.
    #[error("link runtime has stopped")]
    Stopped,
}

/// Point-in-time view of a link, for status displays and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSnapshot {
    pub attached: bool,
    pub phase: HandshakePhase,
    pub role: DiscoveryRole,
    pub establishing: bool,
    pub connected: bool,
    /// A network request is still registered with the OS.
    pub network_requested: bool,
    pub listener_port: Option<u16>,
    pub peer_addr: Option<Ipv6Addr>,
    pub peer_port: Option<u16>,
}

impl LinkSnapshot {
    fn capture(controller: &LinkController) -> Self {
        let state = controller.state();
        let link = state.link();
        Self {
            attached: state.attachment().is_some(),
            phase: state.phase(),
            role: state.role(),
            establishing: state.is_establishing(),
            connected: state.is_connected(),
            network_requested: state.network_requested(),
            listener_port: state.listener_port(),
            peer_addr: link.and_then(|l| l.peer_addr),
            peer_port: link.and_then(|l| l.peer_port),
        }
    }
}

enum Request {
    Attach(oneshot::Sender<()>),
    Advertise(oneshot::Sender<Result<(), LinkError>>),
    Subscribe(oneshot::Sender<Result<(), LinkError>>),
    Send(String, oneshot::Sender<Result<(), LinkError>>),
    Disconnect(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<LinkSnapshot>),
}

/// Cloneable handle for issuing commands to a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<Request>,
}

impl LinkHandle {
    /// Attaches to the discovery transport.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Stopped`] if the runtime has exited.
    pub async fn attach(&self) -> Result<(), RuntimeError> {
        self.call(Request::Attach).await
    }

    /// Publishes the configured service.
    ///
    /// # Errors
    ///
    /// [`LinkError::PermissionDenied`] or [`LinkError::NullSession`] wrapped in
    /// [`RuntimeError::Link`], or [`RuntimeError::Stopped`].
    pub async fn advertise(&self) -> Result<(), RuntimeError> {
        Ok(self.call(Request::Advertise).await??)
    }

    /// Subscribes to the configured service.
    ///
    /// # Errors
    ///
    /// Same as [`advertise`](Self::advertise).
    pub async fn subscribe(&self) -> Result<(), RuntimeError> {
        Ok(self.call(Request::Subscribe).await??)
    }

    /// Sends text to the current peer.
    ///
    /// # Errors
    ///
    /// [`LinkError::NoActiveSession`] or [`LinkError::NoPeer`] wrapped in
    /// [`RuntimeError::Link`], or [`RuntimeError::Stopped`].
    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        let text = text.into();
        Ok(self.call(|reply| Request::Send(text, reply)).await??)
    }

    /// Tears the link down.  Succeeds even if the runtime already stopped.
    pub async fn disconnect(&self) {
        if self.call(Request::Disconnect).await.is_err() {
            debug!("disconnect after runtime stopped");
        }
    }

    /// Returns the current link status.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Stopped`] if the runtime has exited.
    pub async fn snapshot(&self) -> Result<LinkSnapshot, RuntimeError> {
        self.call(Request::Snapshot).await
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        reply_rx.await.map_err(|_| RuntimeError::Stopped)
    }
}

/// Starts a link runtime on the current Tokio runtime.
///
/// `events` is the receiving half of the channel the port adapters were
/// built with.  The task runs until every [`LinkHandle`] is dropped, then
/// disconnects.
pub fn spawn_link(
    settings: MachineSettings,
    ports: LinkPorts,
    events: EventReceiver,
) -> (LinkHandle, mpsc::UnboundedReceiver<Notification>) {
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let controller = LinkController::new(settings, ports, Arc::new(notify_tx));
    tokio::spawn(run(controller, rx, events));
    (LinkHandle { tx }, notify_rx)
}

enum Input {
    Request(Request),
    Event(LinkEvent),
    Shutdown,
}

async fn run(
    mut controller: LinkController,
    mut requests: mpsc::Receiver<Request>,
    mut events: EventReceiver,
) {
    info!("link runtime started");
    loop {
        let input = tokio::select! {
            request = requests.recv() => match request {
                Some(request) => Input::Request(request),
                None => Input::Shutdown,
            },
            Some(event) = events.recv() => Input::Event(event),
            Some(event) = controller.next_task_event(), if controller.has_pending_tasks() => {
                Input::Event(event)
            }
        };

        match input {
            Input::Request(request) => handle_request(&mut controller, request),
            Input::Event(event) => {
                debug!(?event, "platform event");
                controller.handle_event(event);
            }
            Input::Shutdown => break,
        }
    }
    controller.disconnect();
    info!("link runtime stopped");
}

fn handle_request(controller: &mut LinkController, request: Request) {
    // A dropped reply receiver only means the caller stopped waiting.
    match request {
        Request::Attach(reply) => {
            controller.attach();
            let _ = reply.send(());
        }
        Request::Advertise(reply) => {
            let _ = reply.send(controller.advertise());
        }
        Request::Subscribe(reply) => {
            let _ = reply.send(controller.subscribe());
        }
        Request::Send(text, reply) => {
            let _ = reply.send(controller.send_message(text));
        }
        Request::Disconnect(reply) => {
            controller.disconnect();
            let _ = reply.send(());
        }
        Request::Snapshot(reply) => {
            let _ = reply.send(LinkSnapshot::capture(controller));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use awarelink_core::{AttachmentId, NetworkSpecifier, PeerHandle, SessionId};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::application::ports::{
        event_channel, DiscoveryTransport, EventSender, ListenerFactory, NetworkStack,
        PermissionChecker,
    };

    /// Transport that acknowledges attach / subscribe immediately.
    struct EchoTransport {
        events: EventSender,
    }

    impl DiscoveryTransport for EchoTransport {
        fn attach(&self) {
            self.events.send(LinkEvent::Attached(AttachmentId(1)));
        }
        fn close_attachment(&self, _: AttachmentId) {}
        fn publish(&self, _: &str) {
            self.events.send(LinkEvent::PublishStarted(SessionId(1)));
        }
        fn subscribe(&self, _: &str) {
            self.events.send(LinkEvent::SubscribeStarted(SessionId(2)));
        }
        fn send_message(&self, _: SessionId, _: PeerHandle, _: awarelink_core::MessageId, _: &[u8]) {}
        fn close_session(&self, _: SessionId) {}
        fn is_available(&self) -> bool {
            true
        }
    }

    struct NoNetwork;

    impl NetworkStack for NoNetwork {
        fn request_network(&self, _: &NetworkSpecifier) {}
        fn release_request(&self) {}
    }

    struct Allow(bool);

    impl PermissionChecker for Allow {
        fn granted(&self) -> bool {
            self.0
        }
    }

    struct NoListener;

    #[async_trait]
    impl ListenerFactory for NoListener {
        async fn open(&self) -> io::Result<u16> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no listener"))
        }
        fn close(&self, _: u16) {}
    }

    fn start(granted: bool) -> (LinkHandle, mpsc::UnboundedReceiver<Notification>, EventSender) {
        let (events, rx) = event_channel();
        let ports = LinkPorts {
            discovery: Arc::new(EchoTransport { events: events.clone() }),
            network: Arc::new(NoNetwork),
            permissions: Arc::new(Allow(granted)),
            listener: Arc::new(NoListener),
        };
        let (handle, notifications) = spawn_link(MachineSettings::default(), ports, rx);
        (handle, notifications, events)
    }

    async fn attached(handle: &LinkHandle) {
        handle.attach().await.unwrap();
        while !handle.snapshot().await.unwrap().attached {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_snapshot_of_fresh_link_is_idle() {
        // Arrange
        let (handle, _notifications, _events) = start(true);

        // Act
        let snapshot = handle.snapshot().await.unwrap();

        // Assert
        assert!(!snapshot.attached);
        assert_eq!(snapshot.phase, HandshakePhase::Idle);
        assert_eq!(snapshot.role, DiscoveryRole::None);
        assert!(!snapshot.connected);
        assert!(!snapshot.network_requested);
    }

    #[tokio::test]
    async fn test_advertise_before_attach_reports_null_session() {
        let (handle, _notifications, _events) = start(true);

        let result = handle.advertise().await;

        assert_eq!(result, Err(RuntimeError::Link(LinkError::NullSession)));
    }

    #[tokio::test]
    async fn test_subscribe_without_permission_is_denied() {
        let (handle, _notifications, _events) = start(false);
        attached(&handle).await;

        let result = handle.subscribe().await;

        assert_eq!(result, Err(RuntimeError::Link(LinkError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_subscribe_after_attach_enters_awaiting_peer() {
        // Arrange
        let (handle, _notifications, _events) = start(true);
        attached(&handle).await;

        // Act
        assert_ok!(handle.subscribe().await);
        let mut snapshot = handle.snapshot().await.unwrap();
        while snapshot.role == DiscoveryRole::None {
            tokio::task::yield_now().await;
            snapshot = handle.snapshot().await.unwrap();
        }

        // Assert
        assert_eq!(snapshot.role, DiscoveryRole::Subscribing(SessionId(2)));
        assert_eq!(snapshot.phase, HandshakePhase::AwaitingPeer);
    }

    #[tokio::test]
    async fn test_send_without_session_is_rejected() {
        let (handle, _notifications, _events) = start(true);
        assert_err!(handle.send_message("hi").await);
    }

    #[tokio::test]
    async fn test_injected_network_loss_reaches_notification_channel() {
        // Arrange
        let (handle, mut notifications, events) = start(true);

        // Act
        events.send(LinkEvent::NetworkLost(awarelink_core::NetworkId(1)));

        // Assert
        assert_eq!(notifications.recv().await, Some(Notification::Disconnect));
        drop(handle);
    }

    #[tokio::test]
    async fn test_dropping_every_handle_stops_runtime() {
        // Arrange
        let (handle, mut notifications, _events) = start(true);
        let clone = handle.clone();

        // Act
        drop(handle);
        drop(clone);

        // Assert – the controller (and its notification sender) is dropped
        assert_eq!(notifications.recv().await, None);
    }
}
