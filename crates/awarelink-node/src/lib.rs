//! awarelink-node library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does a node do? (for beginners)
//!
//! A *node* is one device taking part in a link.  It owns a single
//! [`awarelink_core::LinkState`] and connects it to the outside world:
//!
//! 1. Platform callbacks (discovery transport, OS network stack) arrive as
//!    `LinkEvent`s through an [`application::ports::EventSender`].
//! 2. Caller requests arrive through a
//!    [`infrastructure::runtime::LinkHandle`].
//! 3. The [`application::lifecycle::LinkController`] feeds both into the
//!    state machine and carries out the resulting effects against the ports.
//! 4. Connect / disconnect / message notifications leave over an mpsc channel
//!    and can be rendered as method-channel invocations by the
//!    [`infrastructure::ui_bridge`].

/// Application layer: port traits and the link controller.
pub mod application;

/// Infrastructure layer: runtime actor, simulated medium, listeners, bridge
/// and configuration storage.
pub mod infrastructure;
