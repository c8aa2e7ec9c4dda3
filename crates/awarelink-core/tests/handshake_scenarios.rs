//! Integration tests for the link state machine.
//!
//! Two machines are wired together through a tiny deterministic harness that
//! plays the part of the discovery transport and the network stack: every
//! effect one device produces is turned into the events the platform would
//! deliver, on either side, until both devices go quiet.

use std::collections::VecDeque;
use std::net::Ipv6Addr;

use awarelink_core::{
    AttachmentId, CapabilityInfo, Effect, HandshakeMessage, HandshakePhase, LinkCommand,
    LinkEvent, LinkState, MachineSettings, NetworkId, NetworkSpecifier, Notification, PeerHandle,
    SessionId,
};

const PUBLISHER: usize = 0;
const SUBSCRIBER: usize = 1;
const LISTEN_PORT: u16 = 54321;

struct Device {
    state: LinkState,
    session: SessionId,
    inbox: VecDeque<LinkEvent>,
    notifications: Vec<Notification>,
    request: Option<NetworkSpecifier>,
    init_connects_sent: usize,
    complete_connects_sent: usize,
    listeners_opened: usize,
}

impl Device {
    fn new(session: u64, passphrase: &str) -> Self {
        let settings = MachineSettings {
            service_name: "COMMANDER_SERVICE".to_string(),
            passphrase: passphrase.to_string(),
            negotiation_timeout: None,
        };
        Self {
            state: LinkState::new(settings),
            session: SessionId(session),
            inbox: VecDeque::new(),
            notifications: Vec::new(),
            request: None,
            init_connects_sent: 0,
            complete_connects_sent: 0,
            listeners_opened: 0,
        }
    }

    fn address(&self) -> Ipv6Addr {
        Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, self.session.0 as u16)
    }
}

/// Simulated radio neighbourhood with two devices in range.
struct Harness {
    devices: [Device; 2],
    publishing: bool,
    subscribing: bool,
    network: Option<NetworkId>,
}

impl Harness {
    fn new() -> Self {
        Self::with_passphrases("somePassword", "somePassword")
    }

    fn with_passphrases(publisher: &str, subscriber: &str) -> Self {
        Self {
            devices: [Device::new(100, publisher), Device::new(200, subscriber)],
            publishing: false,
            subscribing: false,
            network: None,
        }
    }

    fn handle_for(&self, on: usize) -> PeerHandle {
        let other = &self.devices[1 - on];
        PeerHandle::new(self.devices[on].session, other.session.0)
    }

    fn command(&mut self, on: usize, command: LinkCommand) {
        let t = self.devices[on]
            .state
            .execute(command)
            .expect("command must succeed");
        self.devices[on].state = t.state;
        self.perform(on, t.effects);
        self.settle();
    }

    fn inject(&mut self, on: usize, event: LinkEvent) {
        self.devices[on].inbox.push_back(event);
        self.settle();
    }

    fn settle(&mut self) {
        loop {
            let mut progressed = false;
            for on in [PUBLISHER, SUBSCRIBER] {
                if let Some(event) = self.devices[on].inbox.pop_front() {
                    let t = self.devices[on].state.apply(event);
                    self.devices[on].state = t.state;
                    self.perform(on, t.effects);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn perform(&mut self, on: usize, effects: Vec<Effect>) {
        let other = 1 - on;
        for effect in effects {
            match effect {
                Effect::Attach => {
                    let id = AttachmentId(on as u64 + 1);
                    self.devices[on].inbox.push_back(LinkEvent::Attached(id));
                }
                Effect::Publish(_) => {
                    self.publishing = true;
                    let session = self.devices[on].session;
                    self.devices[on].inbox.push_back(LinkEvent::PublishStarted(session));
                    self.announce();
                }
                Effect::Subscribe(_) => {
                    self.subscribing = true;
                    let session = self.devices[on].session;
                    self.devices[on].inbox.push_back(LinkEvent::SubscribeStarted(session));
                    self.announce();
                }
                Effect::CloseSession(_) => {
                    if on == PUBLISHER {
                        self.publishing = false;
                    } else {
                        self.subscribing = false;
                    }
                }
                Effect::SendMessage { message, .. } => {
                    match message {
                        HandshakeMessage::InitConnect => self.devices[on].init_connects_sent += 1,
                        HandshakeMessage::CompleteConnect => {
                            self.devices[on].complete_connects_sent += 1
                        }
                        HandshakeMessage::Payload(_) => {}
                    }
                    let from = self.handle_for(other);
                    self.devices[other]
                        .inbox
                        .push_back(LinkEvent::MessageReceived(from, message.encode()));
                }
                Effect::OpenListener(attempt) => {
                    self.devices[on].listeners_opened += 1;
                    self.devices[on].inbox.push_back(LinkEvent::ListenerOpened {
                        attempt,
                        port: LISTEN_PORT,
                    });
                }
                Effect::RequestNetwork(spec) => {
                    self.devices[on].request = Some(spec);
                    self.try_match();
                }
                Effect::ReleaseNetwork => {
                    self.devices[on].request = None;
                    if let Some(network) = self.network.take() {
                        self.devices[other]
                            .inbox
                            .push_back(LinkEvent::NetworkLost(network));
                    }
                }
                Effect::Notify(n) => self.devices[on].notifications.push(n),
                Effect::CloseAttachment(_)
                | Effect::CloseListener(_)
                | Effect::StartNegotiationTimer { .. }
                | Effect::CancelTasks => {}
            }
        }
    }

    /// Reports the publisher to the subscriber once both sessions exist.
    fn announce(&mut self) {
        if self.publishing && self.subscribing {
            let handle = self.handle_for(SUBSCRIBER);
            self.devices[SUBSCRIBER]
                .inbox
                .push_back(LinkEvent::PeerDiscovered(handle));
        }
    }

    fn try_match(&mut self) {
        let (Some(a), Some(b)) = (&self.devices[0].request, &self.devices[1].request) else {
            return;
        };
        let matched = a.passphrase == b.passphrase;
        let port = a.port.or(b.port);
        if !matched {
            for device in &mut self.devices {
                device.request = None;
                device.inbox.push_back(LinkEvent::NetworkUnavailable);
            }
            return;
        }
        let network = NetworkId(77);
        self.network = Some(network);
        for on in [PUBLISHER, SUBSCRIBER] {
            let peer_ipv6 = self.devices[1 - on].address();
            let device = &mut self.devices[on];
            device.inbox.push_back(LinkEvent::NetworkAvailable(network));
            device.inbox.push_back(LinkEvent::CapabilitiesChanged(
                network,
                CapabilityInfo { peer_ipv6, port },
            ));
        }
    }

    fn bring_up(&mut self) {
        self.command(PUBLISHER, LinkCommand::Attach);
        self.command(SUBSCRIBER, LinkCommand::Attach);
        self.command(PUBLISHER, LinkCommand::Advertise);
        self.command(SUBSCRIBER, LinkCommand::Subscribe);
    }

    fn count(&self, on: usize, wanted: &Notification) -> usize {
        self.devices[on]
            .notifications
            .iter()
            .filter(|n| *n == wanted)
            .count()
    }
}

#[test]
fn test_full_handshake_connects_both_sides() {
    // Arrange
    let mut h = Harness::new();

    // Act
    h.bring_up();

    // Assert
    for on in [PUBLISHER, SUBSCRIBER] {
        let state = &h.devices[on].state;
        assert!(state.is_connected(), "device {on} must be connected");
        assert!(!state.is_establishing());
        assert_eq!(state.phase(), HandshakePhase::Connected);
        assert_eq!(h.count(on, &Notification::Connect), 1);
    }
    assert_eq!(h.devices[SUBSCRIBER].init_connects_sent, 1);
    assert_eq!(h.devices[PUBLISHER].listeners_opened, 1);
    assert_eq!(h.devices[PUBLISHER].complete_connects_sent, 1);
}

#[test]
fn test_full_handshake_uses_publisher_port_on_both_sides() {
    let mut h = Harness::new();

    h.bring_up();

    assert_eq!(h.devices[PUBLISHER].state.listener_port(), Some(LISTEN_PORT));
    let server = h.devices[PUBLISHER].request.clone().expect("server request");
    let client = h.devices[SUBSCRIBER].request.clone().expect("client request");
    assert_eq!(server.port, Some(LISTEN_PORT));
    assert_eq!(client.port, None);
    let link = h.devices[SUBSCRIBER].state.link().copied().expect("link");
    assert_eq!(link.peer_port, Some(LISTEN_PORT));
    assert_eq!(link.peer_addr, Some(h.devices[PUBLISHER].address()));
}

#[test]
fn test_payload_reaches_the_other_side_once_connected() {
    // Arrange
    let mut h = Harness::new();
    h.bring_up();

    // Act
    h.command(SUBSCRIBER, LinkCommand::Send("volume up".into()));
    h.command(PUBLISHER, LinkCommand::Send("ack".into()));

    // Assert
    assert_eq!(
        h.devices[PUBLISHER].notifications.last(),
        Some(&Notification::MessageReceived("volume up".into()))
    );
    assert_eq!(
        h.devices[SUBSCRIBER].notifications.last(),
        Some(&Notification::MessageReceived("ack".into()))
    );
}

#[test]
fn test_passphrase_mismatch_fails_both_sides_with_single_disconnect() {
    // Arrange
    let mut h = Harness::with_passphrases("alpha", "beta");

    // Act
    h.bring_up();

    // Assert
    for on in [PUBLISHER, SUBSCRIBER] {
        let state = &h.devices[on].state;
        assert!(!state.is_connected());
        assert!(!state.is_establishing());
        assert_eq!(state.phase(), HandshakePhase::AwaitingPeer);
        assert_eq!(h.count(on, &Notification::Connect), 0);
        assert_eq!(h.count(on, &Notification::Disconnect), 1);
    }
}

#[test]
fn test_network_loss_then_rediscovery_reconnects() {
    // Arrange
    let mut h = Harness::new();
    h.bring_up();
    let network = h.network.expect("network must be up");

    // Act – the OS drops the link on both sides
    h.network = None;
    h.inject(PUBLISHER, LinkEvent::NetworkLost(network));
    h.inject(SUBSCRIBER, LinkEvent::NetworkLost(network));

    // Assert – clean reset, ready for the next attempt
    for on in [PUBLISHER, SUBSCRIBER] {
        assert!(!h.devices[on].state.is_connected());
        assert_eq!(h.count(on, &Notification::Disconnect), 1);
        assert_eq!(h.devices[on].state.phase(), HandshakePhase::AwaitingPeer);
    }

    // Act – discovery reports the publisher again
    let handle = h.handle_for(SUBSCRIBER);
    h.inject(SUBSCRIBER, LinkEvent::PeerDiscovered(handle));

    // Assert
    for on in [PUBLISHER, SUBSCRIBER] {
        assert!(h.devices[on].state.is_connected());
        assert_eq!(h.count(on, &Notification::Connect), 2);
    }
}

#[test]
fn test_subscriber_disconnect_tears_down_publisher_link() {
    // Arrange
    let mut h = Harness::new();
    h.bring_up();

    // Act
    h.command(SUBSCRIBER, LinkCommand::Disconnect);

    // Assert
    assert!(!h.devices[SUBSCRIBER].state.is_connected());
    assert_eq!(h.count(SUBSCRIBER, &Notification::Disconnect), 0);
    assert!(!h.devices[PUBLISHER].state.is_connected());
    assert_eq!(h.count(PUBLISHER, &Notification::Disconnect), 1);
    assert!(h.devices[PUBLISHER].state.role().is_publishing());
}

#[test]
fn test_repeated_discovery_sends_single_init_connect() {
    // Arrange
    let mut h = Harness::new();
    h.command(PUBLISHER, LinkCommand::Attach);
    h.command(SUBSCRIBER, LinkCommand::Attach);
    h.command(PUBLISHER, LinkCommand::Advertise);
    h.command(SUBSCRIBER, LinkCommand::Subscribe);

    // Act – the transport reports the same publisher twice more
    let handle = h.handle_for(SUBSCRIBER);
    h.inject(SUBSCRIBER, LinkEvent::PeerDiscovered(handle));
    h.inject(SUBSCRIBER, LinkEvent::PeerDiscovered(handle));

    // Assert
    assert_eq!(h.devices[SUBSCRIBER].init_connects_sent, 1);
    assert_eq!(h.devices[PUBLISHER].listeners_opened, 1);
}
