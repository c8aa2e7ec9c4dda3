//! Infrastructure layer for the node.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `awarelink_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`runtime`** – the single Tokio task that owns a `LinkController`, plus
//!   the `LinkHandle` callers use to talk to it.
//!
//! - **`sim`** – an in-memory discovery medium and network stack implementing
//!   the port traits, so nodes can find and connect to each other without
//!   radio hardware.
//!
//! - **`listener`** – `ListenerFactory` implementations: a real TCP listener on
//!   an ephemeral port and a fixed-port variant.
//!
//! - **`ui_bridge`** – method-channel style dispatch of front-end calls and
//!   rendering of notifications as method invocations.
//!
//! - **`storage`** – TOML configuration persistence.

pub mod listener;
pub mod runtime;
pub mod sim;
pub mod storage;
pub mod ui_bridge;
