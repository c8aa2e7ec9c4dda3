//! LinkController: the session lifecycle manager.
//!
//! Owns the [`LinkState`] of one device and is the only place where the
//! state machine meets the ports.  Every entry point follows the same shape:
//!
//! 1. turn the request or callback into a `LinkCommand` / `LinkEvent`,
//! 2. run it through the state machine,
//! 3. perform the returned effects in order.
//!
//! # Structured tasks (for beginners)
//!
//! Opening a listening socket and waiting for the negotiation timeout both
//! take time.  Instead of detached background tasks they run inside a
//! [`JoinSet`] owned by the controller.  When a task finishes it *returns*
//! the `LinkEvent` it produced, which the runtime feeds back through
//! [`LinkController::handle_event`].  The `CancelTasks` effect aborts the
//! whole set, so a cancelled attempt can never deliver a late result.

use std::sync::Arc;

use awarelink_core::{
    Effect, LinkCommand, LinkError, LinkEvent, LinkState, MachineSettings, Notification,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::ports::{LinkObserver, LinkPorts};

/// Drives one device's link against its ports.
pub struct LinkController {
    state: LinkState,
    ports: LinkPorts,
    observer: Arc<dyn LinkObserver>,
    tasks: JoinSet<LinkEvent>,
}

impl LinkController {
    pub fn new(settings: MachineSettings, ports: LinkPorts, observer: Arc<dyn LinkObserver>) -> Self {
        Self {
            state: LinkState::new(settings),
            ports,
            observer,
            tasks: JoinSet::new(),
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// Attaches to the discovery transport if it reports itself available.
    pub fn attach(&mut self) {
        if !self.ports.discovery.is_available() {
            error!("discovery transport is not available; not attaching");
            return;
        }
        info!("registering with the discovery transport");
        self.run_command(LinkCommand::Attach);
    }

    /// Reacts to the discovery subsystem toggling availability: closes the
    /// current attachment unconditionally and re-attaches only if available.
    pub fn on_availability_changed(&mut self, available: bool) {
        self.handle_event(LinkEvent::AvailabilityChanged { available });
    }

    /// Starts publishing the configured service.
    ///
    /// # Errors
    ///
    /// - [`LinkError::PermissionDenied`] if the runtime permissions are missing.
    /// - [`LinkError::NullSession`] if not attached.
    pub fn advertise(&mut self) -> Result<(), LinkError> {
        self.check_permissions()?;
        self.try_command(LinkCommand::Advertise)
    }

    /// Starts subscribing to the configured service.
    ///
    /// # Errors
    ///
    /// Same as [`advertise`](Self::advertise).
    pub fn subscribe(&mut self) -> Result<(), LinkError> {
        self.check_permissions()?;
        self.try_command(LinkCommand::Subscribe)
    }

    /// Sends application text to the current peer over the discovery channel.
    ///
    /// # Errors
    ///
    /// [`LinkError::NoActiveSession`] without a discovery session,
    /// [`LinkError::NoPeer`] before any peer is known.
    pub fn send_message(&mut self, text: impl Into<String>) -> Result<(), LinkError> {
        self.try_command(LinkCommand::Send(text.into()))
    }

    /// Tears down discovery, negotiation and the data path.  Idempotent.
    pub fn disconnect(&mut self) {
        self.run_command(LinkCommand::Disconnect);
    }

    /// Feeds a platform callback (or a finished task's result) to the machine.
    pub fn handle_event(&mut self, event: LinkEvent) {
        let transition = self.state.apply(event);
        self.state = transition.state;
        self.perform(transition.effects);
    }

    /// `true` while at least one structured task is still running.
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Waits for the next structured task to finish and returns its event.
    ///
    /// Aborted tasks are skipped.  Returns `None` once the set is empty.
    pub async fn next_task_event(&mut self) -> Option<LinkEvent> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(event) => return Some(event),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => error!("link task failed: {e}"),
            }
        }
        None
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn check_permissions(&self) -> Result<(), LinkError> {
        if self.ports.permissions.granted() {
            Ok(())
        } else {
            error!("required permissions not granted");
            Err(LinkError::PermissionDenied)
        }
    }

    fn try_command(&mut self, command: LinkCommand) -> Result<(), LinkError> {
        let transition = self.state.execute(command).map_err(|e| {
            warn!("command rejected: {e}");
            e
        })?;
        self.state = transition.state;
        self.perform(transition.effects);
        Ok(())
    }

    /// Runs a command the machine never rejects.
    fn run_command(&mut self, command: LinkCommand) {
        if let Err(e) = self.try_command(command) {
            debug!("ignored command failure: {e}");
        }
    }

    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.perform_one(effect);
        }
    }

    fn perform_one(&mut self, effect: Effect) {
        let ports = &self.ports;
        match effect {
            Effect::Attach => ports.discovery.attach(),
            Effect::CloseAttachment(attachment) => ports.discovery.close_attachment(attachment),
            Effect::Publish(service) => ports.discovery.publish(&service),
            Effect::Subscribe(service) => ports.discovery.subscribe(&service),
            Effect::CloseSession(session) => ports.discovery.close_session(session),
            Effect::SendMessage { session, peer, id, message } => {
                ports
                    .discovery
                    .send_message(session, peer, id, &message.encode());
            }
            Effect::OpenListener(attempt) => {
                let listener = Arc::clone(&ports.listener);
                self.tasks.spawn(async move {
                    match listener.open().await {
                        Ok(port) => LinkEvent::ListenerOpened { attempt, port },
                        Err(e) => LinkEvent::ListenerFailed {
                            attempt,
                            reason: e.to_string(),
                        },
                    }
                });
            }
            Effect::CloseListener(port) => ports.listener.close(port),
            Effect::RequestNetwork(spec) => ports.network.request_network(&spec),
            Effect::ReleaseNetwork => ports.network.release_request(),
            Effect::StartNegotiationTimer { attempt, after } => {
                self.tasks.spawn(async move {
                    tokio::time::sleep(after).await;
                    LinkEvent::NegotiationTimedOut(attempt)
                });
            }
            Effect::CancelTasks => self.tasks.abort_all(),
            Effect::Notify(notification) => self.notify(notification),
        }
    }

    fn notify(&self, notification: Notification) {
        debug!(?notification, "notifying");
        self.observer.notify(notification);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
