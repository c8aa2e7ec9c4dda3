//! Listening sockets for the server side of the data path.
//!
//! The publisher binds a socket on an ephemeral port as soon as it receives
//! `INIT_CONNECT`, and advertises that port in its network request.  The
//! socket is kept open until the attempt ends or the link is released.
//!
//! Sockets are keyed by port: a late report from an abandoned attempt closes
//! its own socket without touching the one the current attempt is using.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::application::ports::ListenerFactory;

/// Binds a real [`TcpListener`] on `address`, port 0.
pub struct TcpListenerFactory {
    address: IpAddr,
    bound: Mutex<HashMap<u16, TcpListener>>,
}

impl TcpListenerFactory {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            bound: Mutex::new(HashMap::new()),
        }
    }

    /// `true` while a socket is bound on `port`.
    pub fn is_open(&self, port: u16) -> bool {
        self.sockets().contains_key(&port)
    }

    fn sockets(&self) -> MutexGuard<'_, HashMap<u16, TcpListener>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TcpListenerFactory {
    /// All IPv6 interfaces (`[::]:0`).
    fn default() -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED))
    }
}

#[async_trait]
impl ListenerFactory for TcpListenerFactory {
    async fn open(&self) -> io::Result<u16> {
        let listener = TcpListener::bind(SocketAddr::new(self.address, 0)).await?;
        let port = listener.local_addr()?.port();
        info!(port, "listening socket bound");
        self.sockets().insert(port, listener);
        Ok(port)
    }

    fn close(&self, port: u16) {
        if self.sockets().remove(&port).is_some() {
            debug!(port, "listening socket closed");
        }
    }
}

/// Reports a fixed port without binding anything.
///
/// Useful where the port must be predictable, such as scenario tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPortListenerFactory {
    port: u16,
}

impl FixedPortListenerFactory {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl ListenerFactory for FixedPortListenerFactory {
    async fn open(&self) -> io::Result<u16> {
        Ok(self.port)
    }

    fn close(&self, _port: u16) {}
}

// ── Tests ─────────────────────────────────────────────────────────────────────
