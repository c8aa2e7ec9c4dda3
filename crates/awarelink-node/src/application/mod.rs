//! Application layer for the node.
//!
//! - **`ports`** – traits for everything outside the process: the discovery
//!   transport, the OS network stack, permission checks and the listening
//!   socket.  Platform adapters implement them in the infrastructure layer.
//!
//! - **`lifecycle`** – `LinkController`, which owns the link state, checks
//!   permissions, performs effects against the ports and keeps the tasks that
//!   belong to the current connection attempt.

pub mod lifecycle;
pub mod ports;
