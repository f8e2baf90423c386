//! Transport abstraction traits for Relay.
//!
//! The gateway never touches room membership directly. Everything it needs
//! from the transport goes through [`RoomAdapter`], which owns the shared
//! room registry and the per-connection outbound queues.

use relay_protocol::Address;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Counter mixed into generated IDs so two connections accepted within the
/// same clock tick still differ.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}{:04x}", timestamp, counter & 0xffff))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is not registered with the transport.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is gone.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// An event queued for delivery to one connection.
///
/// The address and payload are shared between every recipient of a fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Rendered `prefix::event` address.
    pub address: Arc<str>,
    /// Event payload.
    pub payload: Arc<Value>,
}

impl Delivery {
    /// Create a delivery.
    #[must_use]
    pub fn new(address: &Address, payload: Value) -> Self {
        Self {
            address: Arc::from(address.to_string()),
            payload: Arc::new(payload),
        }
    }
}

/// Room primitives the gateway core is built on.
///
/// Implementations own the room registry and must make every operation safe
/// to call concurrently from independent connection handlers. Sends are
/// fire-and-forget: they queue the event and return without waiting for
/// delivery.
pub trait RoomAdapter: Send + Sync {
    /// Add a connection to a room. Joining twice is a no-op.
    fn join(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError>;

    /// Remove a connection from a room. Leaving a room that was never joined
    /// is a no-op.
    fn leave(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError>;

    /// Remove a connection from every room it is in.
    fn leave_all(&self, conn: &ConnectionId) -> Result<(), TransportError>;

    /// Send an event to a single connection.
    fn emit(
        &self,
        conn: &ConnectionId,
        address: &Address,
        payload: Value,
    ) -> Result<(), TransportError>;

    /// Send an event to every member of a room.
    ///
    /// Returns the number of connections the event was queued for.
    fn broadcast_to_room(
        &self,
        room: &str,
        address: &Address,
        payload: Value,
    ) -> Result<usize, TransportError>;

    /// Send an event to every connected client, regardless of membership.
    ///
    /// Returns the number of connections the event was queued for.
    fn broadcast_all(&self, address: &Address, payload: Value) -> Result<usize, TransportError>;

    /// Rooms the connection is currently in.
    fn rooms_of(&self, conn: &ConnectionId) -> Vec<String>;

    /// Connections currently in a room.
    fn members(&self, room: &str) -> Vec<ConnectionId>;
}
