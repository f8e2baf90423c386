//! Acknowledgment envelope.
//!
//! Every command runs inside [`acknowledge`]. Success is replied with `"ok"`.
//! Failure is replied with the error text and, out of band, emitted to the
//! originating connection as `default::_error` so clients that ignore
//! acknowledgments still see it.

use crate::error::GatewayError;
use relay_protocol::Address;
use relay_transport::{ConnectionId, RoomAdapter};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Reply text for a successful command.
pub const OK_REPLY: &str = "ok";

/// The synchronous reply to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The command succeeded.
    Ok,
    /// The command failed; holds the error text and its kind.
    Error {
        message: String,
        kind: &'static str,
    },
}

impl Reply {
    /// Whether the command succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok)
    }

    /// The reply string sent to the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Reply::Ok => OK_REPLY,
            Reply::Error { message, .. } => message,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run a command handler and turn its outcome into a [`Reply`].
pub fn acknowledge<F>(adapter: &dyn RoomAdapter, conn: &ConnectionId, handler: F) -> Reply
where
    F: FnOnce() -> Result<(), GatewayError>,
{
    match handler() {
        Ok(()) => Reply::Ok,
        Err(err) => {
            let message = err.to_string();
            warn!(connection = %conn, error = %message, "Command failed");

            if let Err(e) = adapter.emit(conn, &Address::error(), Value::String(message.clone())) {
                debug!(connection = %conn, error = %e, "Could not emit error event");
            }

            Reply::Error {
                message,
                kind: err.kind(),
            }
        }
    }
}
