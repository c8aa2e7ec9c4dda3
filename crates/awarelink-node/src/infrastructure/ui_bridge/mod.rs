//! Method-channel bridge between a front end and the link runtime.
//!
//! The front end talks to the node through named method calls and receives
//! named method invocations back:
//!
//! ```text
//! Front end                          Node
//! ──────────────────────────────────────────────────────────────
//! "discoverWifiDevices"        ──►   LinkHandle::subscribe
//! "advertiseCommanderService"  ──►   LinkHandle::advertise
//! "disconnect"                 ──►   LinkHandle::disconnect
//! "sendMsg"  (string argument) ──►   LinkHandle::send_message
//!
//! onConnect / onDisconnect     ◄──   Notification::Connect / Disconnect
//! onError(msg)                 ◄──   Notification::Error
//! receivedMessage(msg)         ◄──   Notification::MessageReceived
//! messageSendFailed            ◄──   Notification::MessageSendFailed
//! ```
//!
//! # `CommandResult<T>`
//!
//! Every call returns the same envelope:
//! ```json
//! { "success": true,  "data": null, "error": null }
//! { "success": false, "data": null, "error": { "code": "NO_PEER", "message": "no peer to send to" } }
//! ```
//! The `code` values are stable; `message` is for humans.

use awarelink_core::{LinkError, Notification};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::infrastructure::runtime::{LinkHandle, RuntimeError};

pub const METHOD_DISCOVER: &str = "discoverWifiDevices";
pub const METHOD_ADVERTISE: &str = "advertiseCommanderService";
pub const METHOD_DISCONNECT: &str = "disconnect";
pub const METHOD_SEND: &str = "sendMsg";

/// An incoming call from the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: None,
        }
    }

    pub fn with_arguments(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments: Some(arguments),
        }
    }
}

/// Machine-readable error carried in a failed [`CommandResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeError {
    pub code: String,
    pub message: String,
}

impl BridgeError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for BridgeError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Link(link) => BridgeError::from(link),
            RuntimeError::Stopped => BridgeError::new("RUNTIME_STOPPED", e.to_string()),
        }
    }
}

impl From<LinkError> for BridgeError {
    fn from(e: LinkError) -> Self {
        BridgeError::new(e.code(), e.to_string())
    }
}

/// Unified response wrapper for bridge calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    /// `true` if the call completed successfully.
    pub success: bool,
    /// The call's return value, present only on success.
    pub data: Option<T>,
    /// Present only on failure.
    pub error: Option<BridgeError>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<BridgeError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Error code of a failed result.
    pub fn code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

impl CommandResult<()> {
    fn from_runtime(result: Result<(), RuntimeError>) -> Self {
        match result {
            Ok(()) => Self::ok(()),
            Err(e) => Self::err(e),
        }
    }
}

/// Dispatches one front-end call to the link.
pub async fn handle_method_call(handle: &LinkHandle, call: MethodCall) -> CommandResult<()> {
    debug!(method = %call.method, "method call");
    match call.method.as_str() {
        METHOD_DISCOVER => CommandResult::from_runtime(handle.subscribe().await),
        METHOD_ADVERTISE => CommandResult::from_runtime(handle.advertise().await),
        METHOD_DISCONNECT => {
            handle.disconnect().await;
            CommandResult::ok(())
        }
        METHOD_SEND => match call.arguments {
            Some(Value::String(text)) => CommandResult::from_runtime(handle.send_message(text).await),
            other => {
                warn!(arguments = ?other, "sendMsg needs a string argument");
                CommandResult::err(BridgeError::new(
                    "BAD_ARGUMENTS",
                    "sendMsg expects a single string argument",
                ))
            }
        },
        unknown => CommandResult::err(BridgeError::new(
            "NOT_IMPLEMENTED",
            format!("unknown method '{unknown}'"),
        )),
    }
}

// ── Outgoing invocations ──────────────────────────────────────────────────────

/// A method invocation pushed to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInvocation {
    pub method: &'static str,
    pub arguments: Option<String>,
}

impl MethodInvocation {
    /// JSON form of the invocation.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization errors.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Notification> for MethodInvocation {
    fn from(notification: Notification) -> Self {
        let (method, arguments) = match notification {
            Notification::Connect => ("onConnect", None),
            Notification::Disconnect => ("onDisconnect", None),
            Notification::Error(msg) => ("onError", Some(msg)),
            Notification::MessageReceived(msg) => ("receivedMessage", Some(msg)),
            Notification::MessageSendFailed => ("messageSendFailed", None),
        };
        Self { method, arguments }
    }
}

/// Forwards notifications to `sink` as method invocations until the link
/// runtime stops.
pub async fn forward_notifications(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    mut sink: impl FnMut(MethodInvocation),
) {
    while let Some(notification) = notifications.recv().await {
        sink(MethodInvocation::from(notification));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
