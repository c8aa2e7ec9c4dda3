//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the node's TOML file from the platform
//! config directory (or an explicit path), fills in defaults for anything
//! missing, and writes it back when asked.

pub mod config;
