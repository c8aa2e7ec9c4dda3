//! Transition rules for [`LinkState`].
//!
//! Subscriber side:
//!
//! ```text
//! Idle ─subscribe─► AwaitingPeer ─PeerDiscovered/INIT_CONNECT─► Negotiating
//!                                                                  │
//!                                   COMPLETE_CONNECT / RequestNetwork (client)
//!                                                                  ▼
//!                                                              Connected
//! ```
//!
//! Publisher side:
//!
//! ```text
//! Idle ─advertise─► AwaitingPeer ─INIT_CONNECT/OpenListener─► Negotiating
//!                                                                  │
//!               ListenerOpened / RequestNetwork (server) + COMPLETE_CONNECT
//!                                                                  │
//!                                              NetworkAvailable    ▼
//!                                                              Connected
//! ```

use tracing::{debug, error, info, warn};

use super::{
    Effect, HandshakePhase, LinkCommand, LinkError, LinkEvent, LinkState, Notification,
    RequestedRole, Transition,
};
use crate::domain::link::{ActiveLink, CapabilityInfo, ConnectionAttempt, NegotiationMode, NetworkSpecifier};
use crate::domain::peer::{AttemptId, DiscoveryRole, NetworkId, PeerHandle, SessionId};
use crate::protocol::messages::HandshakeMessage;

impl LinkState {
    /// Applies a platform event.  Events never fail; anything that does not
    /// fit the current state is logged and ignored.
    pub fn apply(&self, event: LinkEvent) -> Transition {
        let mut state = self.clone();
        let mut effects = Vec::new();
        state.on_event(event, &mut effects);
        Transition { state, effects }
    }

    /// Applies a caller command.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NullSession`] for advertise/subscribe without an attachment.
    /// - [`LinkError::NoActiveSession`] / [`LinkError::NoPeer`] for a send with
    ///   nothing to send through.
    ///
    /// On error the state is unchanged and no effect is produced.
    pub fn execute(&self, command: LinkCommand) -> Result<Transition, LinkError> {
        let mut state = self.clone();
        let mut effects = Vec::new();
        state.on_command(command, &mut effects)?;
        Ok(Transition { state, effects })
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn on_command(&mut self, command: LinkCommand, fx: &mut Vec<Effect>) -> Result<(), LinkError> {
        match command {
            LinkCommand::Attach => {
                self.teardown_discovery(fx);
                if let Some(old) = self.attachment.take() {
                    fx.push(Effect::CloseAttachment(old));
                }
                fx.push(Effect::Attach);
            }
            LinkCommand::Advertise => {
                if self.attachment.is_none() {
                    return Err(LinkError::NullSession);
                }
                self.teardown_discovery(fx);
                self.requested = Some(RequestedRole::Publish);
                info!(service = %self.settings.service_name, "advertising service");
                fx.push(Effect::Publish(self.settings.service_name.clone()));
            }
            LinkCommand::Subscribe => {
                if self.attachment.is_none() {
                    return Err(LinkError::NullSession);
                }
                self.teardown_discovery(fx);
                self.requested = Some(RequestedRole::Subscribe);
                info!(service = %self.settings.service_name, "subscribing to service");
                fx.push(Effect::Subscribe(self.settings.service_name.clone()));
            }
            LinkCommand::Send(text) => {
                let session = self.role.session().ok_or(LinkError::NoActiveSession)?;
                let peer = self.peer.ok_or(LinkError::NoPeer)?;
                fx.push(send(session, peer, HandshakeMessage::Payload(text)));
            }
            LinkCommand::Disconnect => {
                debug!("disconnect requested");
                self.teardown_discovery(fx);
            }
        }
        Ok(())
    }

    // ── Events ────────────────────────────────────────────────────────────────

    fn on_event(&mut self, event: LinkEvent, fx: &mut Vec<Effect>) {
        match event {
            LinkEvent::Attached(id) => {
                info!(attachment = id.0, "attached to discovery transport");
                self.attachment = Some(id);
            }
            LinkEvent::AttachFailed => {
                error!("attach to discovery transport failed");
                self.attachment = None;
                let err = LinkError::Transport("attach failed".to_string());
                fx.push(Effect::Notify(Notification::Error(err.to_string())));
            }
            LinkEvent::AttachmentTerminated => {
                info!("discovery attachment terminated");
                self.attachment = None;
            }
            LinkEvent::AvailabilityChanged { available } => self.on_availability(available, fx),
            LinkEvent::PublishStarted(session) => {
                self.on_discovery_started(session, RequestedRole::Publish, fx)
            }
            LinkEvent::SubscribeStarted(session) => {
                self.on_discovery_started(session, RequestedRole::Subscribe, fx)
            }
            LinkEvent::DiscoveryConfigFailed => {
                error!("discovery session configuration failed");
                self.requested = None;
                let err = LinkError::Transport("discovery session configuration failed".into());
                fx.push(Effect::Notify(Notification::Error(err.to_string())));
            }
            LinkEvent::PeerDiscovered(peer) => self.on_peer_discovered(peer, fx),
            LinkEvent::MessageReceived(peer, bytes) => self.on_message(peer, &bytes, fx),
            LinkEvent::MessageSendFailed(id) => {
                if self.is_connected() {
                    warn!(%id, "message send failed");
                    fx.push(Effect::Notify(Notification::MessageSendFailed));
                } else {
                    debug!(%id, "message send failed before the link was up");
                }
            }
            LinkEvent::SessionTerminated(session) => self.on_session_terminated(session, fx),
            LinkEvent::ListenerOpened { attempt, port } => self.on_listener_opened(attempt, port, fx),
            LinkEvent::ListenerFailed { attempt, reason } => {
                if !self.is_current(attempt) {
                    debug!(%attempt, "ignoring listener failure for a finished attempt");
                    return;
                }
                error!(%attempt, %reason, "could not open listening port");
                self.abandon_attempt(fx);
                fx.push(Effect::Notify(Notification::Error(format!(
                    "failed to open listening port: {reason}"
                ))));
            }
            LinkEvent::NetworkAvailable(network) => self.on_network_available(network, fx),
            LinkEvent::CapabilitiesChanged(network, info) => {
                self.on_capabilities_changed(network, info)
            }
            LinkEvent::NetworkUnavailable => self.on_link_down(LinkError::NetworkUnavailable, fx),
            LinkEvent::NetworkLost(network) => {
                if self.is_stale_loss(network) {
                    debug!(%network, "ignoring loss of a network no longer in use");
                    return;
                }
                debug!(%network, "network lost");
                self.on_link_down(LinkError::NetworkLost, fx)
            }
            LinkEvent::NegotiationTimedOut(attempt) => {
                if self.is_current(attempt) && !self.is_connected() {
                    warn!(%attempt, "negotiation timed out");
                    self.on_link_down(LinkError::NetworkUnavailable, fx);
                } else {
                    debug!(%attempt, "ignoring timer for a finished attempt");
                }
            }
        }
    }

    fn on_availability(&mut self, available: bool, fx: &mut Vec<Effect>) {
        let was_linked = self.role.is_active() || self.link.is_some();
        self.teardown_discovery(fx);
        if let Some(attachment) = self.attachment.take() {
            fx.push(Effect::CloseAttachment(attachment));
        }
        if was_linked {
            fx.push(Effect::Notify(Notification::Disconnect));
        }
        if available {
            info!("discovery availability changed; re-attaching");
            fx.push(Effect::Attach);
        } else {
            error!("discovery subsystem is not available");
        }
    }

    fn on_discovery_started(&mut self, session: SessionId, kind: RequestedRole, fx: &mut Vec<Effect>) {
        if self.requested != Some(kind) {
            debug!(%session, "closing discovery session nobody asked for");
            fx.push(Effect::CloseSession(session));
            return;
        }
        self.requested = None;
        self.teardown_discovery(fx);
        self.role = match kind {
            RequestedRole::Publish => DiscoveryRole::Publishing(session),
            RequestedRole::Subscribe => DiscoveryRole::Subscribing(session),
        };
        self.phase = HandshakePhase::AwaitingPeer;
        info!(%session, role = ?self.role, "discovery session started");
    }

    fn on_peer_discovered(&mut self, peer: PeerHandle, fx: &mut Vec<Effect>) {
        let DiscoveryRole::Subscribing(session) = self.role else {
            warn!(%peer, "peer discovered without a subscribe session");
            return;
        };
        if !peer.belongs_to(session) {
            warn!(%peer, "ignoring peer from a stale session");
            return;
        }
        if self.is_establishing() {
            warn!(%peer, "already establishing a connection; skipping INIT_CONNECT");
            return;
        }
        self.supersede_link(fx);
        info!(%peer, "discovered publisher; sending INIT_CONNECT");
        let id = self.begin_attempt(peer, NegotiationMode::Client);
        fx.push(send(session, peer, HandshakeMessage::InitConnect));
        self.arm_timer(id, fx);
    }

    fn on_message(&mut self, peer: PeerHandle, bytes: &[u8], fx: &mut Vec<Effect>) {
        let Some(session) = self.role.session() else {
            debug!(%peer, "message arrived with no active discovery session");
            return;
        };
        if !peer.belongs_to(session) {
            warn!(%peer, "ignoring message from a stale session");
            return;
        }
        let message = match HandshakeMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(%peer, "dropping undecodable message: {e}");
                return;
            }
        };
        debug!(%peer, text = message.as_text(), "message received");
        match message {
            HandshakeMessage::InitConnect => self.on_init_connect(session, peer, fx),
            HandshakeMessage::CompleteConnect => self.on_complete_connect(session, peer, fx),
            HandshakeMessage::Payload(text) => {
                if self.link.is_some() {
                    fx.push(Effect::Notify(Notification::MessageReceived(text)));
                } else {
                    debug!(%peer, "dropping payload received before the data path exists");
                }
            }
        }
    }

    fn on_init_connect(&mut self, session: SessionId, peer: PeerHandle, fx: &mut Vec<Effect>) {
        if !self.role.is_publishing() {
            warn!(%peer, "INIT_CONNECT received while not publishing");
            return;
        }
        if self.is_establishing() {
            debug!(%peer, "already establishing a connection; skipping INIT_CONNECT");
            return;
        }
        self.supersede_link(fx);
        info!(%peer, %session, "INIT_CONNECT received; opening listening port");
        let id = self.begin_attempt(peer, NegotiationMode::Server { port: None });
        fx.push(Effect::OpenListener(id));
        self.arm_timer(id, fx);
    }

    fn on_listener_opened(&mut self, attempt: AttemptId, port: u16, fx: &mut Vec<Effect>) {
        let DiscoveryRole::Publishing(session) = self.role else {
            debug!(%attempt, port, "listener opened after publishing stopped");
            fx.push(Effect::CloseListener(port));
            return;
        };
        let Some(current) = self.attempt.as_mut().filter(|a| a.id == attempt) else {
            debug!(%attempt, port, "listener opened for a finished attempt");
            if self.listener_port != Some(port) {
                fx.push(Effect::CloseListener(port));
            }
            return;
        };
        if current.mode != (NegotiationMode::Server { port: None }) {
            debug!(%attempt, port, "listener already bound for this attempt");
            if self.listener_port != Some(port) {
                fx.push(Effect::CloseListener(port));
            }
            return;
        }
        current.mode = NegotiationMode::Server { port: Some(port) };
        let peer = current.peer;
        self.listener_port = Some(port);
        self.network_requested = true;
        info!(%peer, port, "requesting server-mode network; sending COMPLETE_CONNECT");
        fx.push(Effect::RequestNetwork(NetworkSpecifier::server(
            session,
            peer,
            self.settings.passphrase.clone(),
            port,
        )));
        fx.push(send(session, peer, HandshakeMessage::CompleteConnect));
    }

    fn on_complete_connect(&mut self, session: SessionId, peer: PeerHandle, fx: &mut Vec<Effect>) {
        if !self.role.is_subscribing() {
            warn!(%peer, "COMPLETE_CONNECT received while not subscribing");
            return;
        }
        if self.phase != HandshakePhase::Negotiating || self.network_requested {
            debug!(%peer, "ignoring unexpected COMPLETE_CONNECT");
            return;
        }
        let Some(attempt) = self.attempt.as_mut() else {
            debug!(%peer, "COMPLETE_CONNECT without an attempt in flight");
            return;
        };
        attempt.peer = peer;
        self.peer = Some(peer);
        self.network_requested = true;
        self.phase = HandshakePhase::Connected;
        info!(%peer, "establishing client-mode connection to publisher");
        fx.push(Effect::RequestNetwork(NetworkSpecifier::client(
            session,
            peer,
            self.settings.passphrase.clone(),
        )));
    }

    fn on_network_available(&mut self, network: NetworkId, fx: &mut Vec<Effect>) {
        if !self.network_requested {
            debug!(%network, "ignoring availability for a released request");
            return;
        }
        info!(%network, "network available");
        if self.attempt.take().is_some() {
            fx.push(Effect::CancelTasks);
        }
        let link = self.link.get_or_insert_with(|| ActiveLink::pending(network));
        link.network = network;
        link.connected = true;
        self.phase = HandshakePhase::Connected;
        fx.push(Effect::Notify(Notification::Connect));
    }

    fn on_capabilities_changed(&mut self, network: NetworkId, info: CapabilityInfo) {
        if !self.network_requested {
            debug!(%network, "ignoring capabilities for a released request");
            return;
        }
        debug!(%network, peer = %info.peer_ipv6, port = ?info.port, "network capabilities changed");
        let link = self.link.get_or_insert_with(|| ActiveLink::pending(network));
        link.network = network;
        link.peer_addr = Some(info.peer_ipv6);
        link.peer_port = info.port;
    }

    fn on_link_down(&mut self, reason: LinkError, fx: &mut Vec<Effect>) {
        warn!("{reason}");
        self.release_negotiation(fx);
        self.peer = None;
        self.phase = self.resting_phase();
        fx.push(Effect::Notify(Notification::Disconnect));
    }

    fn on_session_terminated(&mut self, session: SessionId, fx: &mut Vec<Effect>) {
        if self.role.session() != Some(session) {
            debug!(%session, "ignoring termination of an inactive session");
            return;
        }
        info!(%session, "discovery session terminated");
        self.role = DiscoveryRole::None;
        self.peer = None;
        self.release_negotiation(fx);
        self.phase = HandshakePhase::Idle;
        fx.push(Effect::Notify(Notification::Disconnect));
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn begin_attempt(&mut self, peer: PeerHandle, mode: NegotiationMode) -> AttemptId {
        let id = AttemptId(self.next_attempt);
        self.next_attempt += 1;
        self.attempt = Some(ConnectionAttempt { id, peer, mode });
        self.peer = Some(peer);
        self.phase = HandshakePhase::Negotiating;
        id
    }

    fn arm_timer(&self, attempt: AttemptId, fx: &mut Vec<Effect>) {
        if let Some(after) = self.settings.negotiation_timeout {
            fx.push(Effect::StartNegotiationTimer { attempt, after });
        }
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.attempt.is_some_and(|a| a.id == attempt)
    }

    /// A loss report for a network other than the current link's.
    ///
    /// The network and discovery streams are not ordered against each other,
    /// so the loss of a link this device already released (or replaced with
    /// a new attempt) can arrive late.
    fn is_stale_loss(&self, network: NetworkId) -> bool {
        match self.link {
            Some(link) => link.network != network,
            None => self.released_network == Some(network) || self.is_establishing(),
        }
    }

    /// Releases a live link before a new attempt takes its place.
    fn supersede_link(&mut self, fx: &mut Vec<Effect>) {
        if !self.is_connected() {
            return;
        }
        info!("new attempt replaces the current link");
        self.release_negotiation(fx);
        fx.push(Effect::Notify(Notification::Disconnect));
    }

    /// Phase to fall back to once nothing is in flight.
    fn resting_phase(&self) -> HandshakePhase {
        if self.role.is_active() {
            HandshakePhase::AwaitingPeer
        } else {
            HandshakePhase::Idle
        }
    }

    /// Drops the in-flight attempt without touching the discovery session.
    fn abandon_attempt(&mut self, fx: &mut Vec<Effect>) {
        self.release_negotiation(fx);
        self.phase = self.resting_phase();
    }

    /// Releases everything negotiation owns: tasks, listener, network request
    /// and the link built on top of it.
    fn release_negotiation(&mut self, fx: &mut Vec<Effect>) {
        if self.attempt.take().is_some() {
            fx.push(Effect::CancelTasks);
        }
        if let Some(port) = self.listener_port.take() {
            fx.push(Effect::CloseListener(port));
        }
        if self.network_requested {
            self.network_requested = false;
            fx.push(Effect::ReleaseNetwork);
        }
        if let Some(link) = self.link.take() {
            self.released_network = Some(link.network);
        }
    }

    /// Closes the active discovery session and everything tied to it.
    fn teardown_discovery(&mut self, fx: &mut Vec<Effect>) {
        if let Some(session) = self.role.session() {
            fx.push(Effect::CloseSession(session));
        }
        self.role = DiscoveryRole::None;
        self.requested = None;
        self.peer = None;
        self.release_negotiation(fx);
        self.phase = HandshakePhase::Idle;
    }
}

fn send(session: SessionId, peer: PeerHandle, message: HandshakeMessage) -> Effect {
    Effect::SendMessage {
        session,
        peer,
        id: message.message_id(),
        message,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
