//! In-memory discovery medium.
//!
//! A deterministic stand-in for the radio and the OS network stack so that
//! several nodes can discover each other, exchange handshake messages and
//! bring up a data path inside one process.
//!
//! # Model (for beginners)
//!
//! ```text
//!               SimMedium (shared, behind a Mutex)
//!        ┌────────────────────┴────────────────────┐
//!   SimRadio + SimNetwork                     SimRadio + SimNetwork
//!   (node A, fe80::1)                         (node B, fe80::2)
//! ```
//!
//! - Every radio gets a link-local address `fe80::<n>`.
//! - Sessions are numbered medium-wide.  A [`PeerHandle`] handed to a node
//!   carries the node's own session plus the remote session number as its
//!   instance, which is how messages find their way back.
//! - A data path comes up when two radios hold requests naming each other,
//!   exactly one of them carrying a port (the server side).
//!
//! All callbacks are delivered through each radio's [`EventSender`], in the
//! order the medium produced them.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use awarelink_core::{
    AttachmentId, CapabilityInfo, LinkEvent, MessageId, NetworkId, NetworkSpecifier, PeerHandle,
    SessionId,
};
use tracing::{debug, info, warn};

use crate::application::ports::{DiscoveryTransport, EventSender, NetworkStack, PermissionChecker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionKind {
    Publish,
    Subscribe,
}

struct Radio {
    events: EventSender,
    address: Ipv6Addr,
    attachment: Option<AttachmentId>,
}

struct Session {
    radio: u64,
    service: String,
    kind: SessionKind,
}

struct Link {
    radios: [u64; 2],
    network: NetworkId,
}

#[derive(Default)]
struct Medium {
    unavailable: bool,
    radios: HashMap<u64, Radio>,
    sessions: HashMap<SessionId, Session>,
    requests: HashMap<u64, NetworkSpecifier>,
    links: Vec<Link>,
    next_id: u64,
    next_host: u64,
}

impl Medium {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Link-local address for the next radio: `fe80::` plus a host number
    /// counted separately from session and network ids.
    fn next_address(&mut self) -> Ipv6Addr {
        self.next_host += 1;
        Ipv6Addr::from((0xfe80_u128 << 112) | u128::from(self.next_host))
    }

    fn emit(&self, radio: u64, event: LinkEvent) {
        if let Some(r) = self.radios.get(&radio) {
            r.events.send(event);
        }
    }

    /// Reports every matching counterpart of `session` to its subscriber.
    fn announce(&self, session: SessionId) {
        let Some(this) = self.sessions.get(&session) else {
            return;
        };
        for (&other_id, other) in &self.sessions {
            if other.radio == this.radio || other.service != this.service || other.kind == this.kind {
                continue;
            }
            let (subscriber, publisher) = match this.kind {
                SessionKind::Subscribe => (session, other_id),
                SessionKind::Publish => (other_id, session),
            };
            let Some(sub) = self.sessions.get(&subscriber) else {
                continue;
            };
            debug!(%subscriber, %publisher, "service discovered");
            self.emit(
                sub.radio,
                LinkEvent::PeerDiscovered(PeerHandle::new(subscriber, publisher.0)),
            );
        }
    }

    /// The radio a request from `radio` is aimed at.
    fn target_of(&self, spec: &NetworkSpecifier) -> Option<u64> {
        self.sessions
            .get(&SessionId(spec.peer.instance))
            .map(|s| s.radio)
    }

    fn try_match(&mut self, radio: u64) {
        let Some(mine) = self.requests.get(&radio) else {
            return;
        };
        let Some(other) = self.target_of(mine) else {
            return;
        };
        let Some(theirs) = self.requests.get(&other) else {
            return;
        };
        if self.target_of(theirs) != Some(radio) {
            return;
        }
        if mine.port.is_some() == theirs.port.is_some() {
            debug!(radio, other, "both requests in the same mode; waiting");
            return;
        }
        let port = mine.port.or(theirs.port);
        if mine.passphrase != theirs.passphrase {
            warn!(radio, other, "passphrase mismatch; network unavailable");
            self.requests.remove(&radio);
            self.requests.remove(&other);
            self.emit(radio, LinkEvent::NetworkUnavailable);
            self.emit(other, LinkEvent::NetworkUnavailable);
            return;
        }
        let network = NetworkId(self.next_id());
        self.links.push(Link {
            radios: [radio, other],
            network,
        });
        info!(%network, radio, other, ?port, "data path up");
        for (local, remote) in [(radio, other), (other, radio)] {
            let Some(peer_ipv6) = self.radios.get(&remote).map(|r| r.address) else {
                continue;
            };
            self.emit(local, LinkEvent::NetworkAvailable(network));
            self.emit(
                local,
                LinkEvent::CapabilitiesChanged(network, CapabilityInfo { peer_ipv6, port }),
            );
        }
    }
}

/// Shared medium connecting simulated radios.
#[derive(Clone, Default)]
pub struct SimMedium {
    inner: Arc<Mutex<Medium>>,
}

impl SimMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a radio whose callbacks are delivered through `events`.
    pub fn radio(&self, events: EventSender) -> (SimRadio, SimNetwork) {
        let mut medium = self.lock();
        let id = medium.next_id();
        let address = medium.next_address();
        medium.radios.insert(
            id,
            Radio {
                events,
                address,
                attachment: None,
            },
        );
        debug!(radio = id, %address, "radio joined medium");
        (
            SimRadio {
                id,
                medium: self.clone(),
            },
            SimNetwork {
                id,
                medium: self.clone(),
            },
        )
    }

    /// Toggles discovery availability and tells every radio about it.
    pub fn set_available(&self, available: bool) {
        let mut medium = self.lock();
        medium.unavailable = !available;
        info!(available, "medium availability changed");
        for radio in medium.radios.values() {
            radio.events.send(LinkEvent::AvailabilityChanged { available });
        }
    }

    /// Drops every active data path, reporting the loss on both sides.
    pub fn drop_link(&self) {
        let mut medium = self.lock();
        let links = std::mem::take(&mut medium.links);
        for link in links {
            info!(network = %link.network, "dropping data path");
            for radio in link.radios {
                medium.emit(radio, LinkEvent::NetworkLost(link.network));
            }
        }
    }

    /// Terminates a discovery session from the medium's side.
    pub fn terminate_session(&self, session: SessionId) {
        let mut medium = self.lock();
        if let Some(s) = medium.sessions.remove(&session) {
            medium.emit(s.radio, LinkEvent::SessionTerminated(session));
        }
    }

    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }

    fn lock(&self) -> MutexGuard<'_, Medium> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Discovery transport backed by a [`SimMedium`].
pub struct SimRadio {
    id: u64,
    medium: SimMedium,
}

impl SimRadio {
    pub fn address(&self) -> Option<Ipv6Addr> {
        self.medium.lock().radios.get(&self.id).map(|r| r.address)
    }

    fn open_session(&self, service: &str, kind: SessionKind) {
        let mut medium = self.medium.lock();
        let attached = medium
            .radios
            .get(&self.id)
            .is_some_and(|r| r.attachment.is_some());
        if !attached {
            warn!(radio = self.id, "discovery session requested without attachment");
            medium.emit(self.id, LinkEvent::DiscoveryConfigFailed);
            return;
        }
        let session = SessionId(medium.next_id());
        medium.sessions.insert(
            session,
            Session {
                radio: self.id,
                service: service.to_string(),
                kind,
            },
        );
        let started = match kind {
            SessionKind::Publish => LinkEvent::PublishStarted(session),
            SessionKind::Subscribe => LinkEvent::SubscribeStarted(session),
        };
        medium.emit(self.id, started);
        medium.announce(session);
    }
}

impl DiscoveryTransport for SimRadio {
    fn attach(&self) {
        let mut medium = self.medium.lock();
        if medium.unavailable {
            medium.emit(self.id, LinkEvent::AttachFailed);
            return;
        }
        let attachment = AttachmentId(medium.next_id());
        if let Some(radio) = medium.radios.get_mut(&self.id) {
            radio.attachment = Some(attachment);
            radio.events.send(LinkEvent::Attached(attachment));
        }
    }

    fn close_attachment(&self, attachment: AttachmentId) {
        let mut medium = self.medium.lock();
        let id = self.id;
        if let Some(radio) = medium.radios.get_mut(&id) {
            if radio.attachment == Some(attachment) {
                radio.attachment = None;
            }
        }
        medium.sessions.retain(|_, s| s.radio != id);
    }

    fn publish(&self, service: &str) {
        self.open_session(service, SessionKind::Publish);
    }

    fn subscribe(&self, service: &str) {
        self.open_session(service, SessionKind::Subscribe);
    }

    fn send_message(&self, session: SessionId, peer: PeerHandle, id: MessageId, bytes: &[u8]) {
        let medium = self.medium.lock();
        let target = SessionId(peer.instance);
        let own = medium.sessions.get(&session).is_some_and(|s| s.radio == self.id);
        match medium.sessions.get(&target) {
            Some(remote) if own => {
                medium.emit(
                    remote.radio,
                    LinkEvent::MessageReceived(PeerHandle::new(target, session.0), bytes.to_vec()),
                );
            }
            _ => {
                debug!(%session, %peer, %id, "message undeliverable");
                medium.emit(self.id, LinkEvent::MessageSendFailed(id));
            }
        }
    }

    fn close_session(&self, session: SessionId) {
        let mut medium = self.medium.lock();
        if medium.sessions.get(&session).is_some_and(|s| s.radio == self.id) {
            medium.sessions.remove(&session);
        }
    }

    fn is_available(&self) -> bool {
        !self.medium.lock().unavailable
    }
}

/// Network stack backed by a [`SimMedium`].
pub struct SimNetwork {
    id: u64,
    medium: SimMedium,
}

impl NetworkStack for SimNetwork {
    fn request_network(&self, spec: &NetworkSpecifier) {
        let mut medium = self.medium.lock();
        medium.requests.insert(self.id, spec.clone());
        medium.try_match(self.id);
    }

    fn release_request(&self) {
        let mut medium = self.medium.lock();
        medium.requests.remove(&self.id);
        let id = self.id;
        let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut medium.links)
            .into_iter()
            .partition(|l| l.radios.contains(&id));
        medium.links = kept;
        for link in released {
            for radio in link.radios.into_iter().filter(|&r| r != id) {
                medium.emit(radio, LinkEvent::NetworkLost(link.network));
            }
        }
    }
}

/// Toggleable permission check.
#[derive(Debug)]
pub struct SimPermissions {
    granted: AtomicBool,
}

impl SimPermissions {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::Relaxed);
    }
}

impl Default for SimPermissions {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PermissionChecker for SimPermissions {
    fn granted(&self) -> bool {
        self.granted.load(Ordering::Relaxed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
