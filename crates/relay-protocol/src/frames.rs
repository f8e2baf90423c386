//! Frame types for the Relay protocol.
//!
//! Commands from clients and events from the server share the `emit` frame:
//! a client emits `subscribe` / `unsubscribe` / `broadcast` with a payload,
//! the server emits addressed events such as `room1::ping`. Commands that
//! carry an `id` are answered with an `ack` frame holding the reply string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current protocol version, announced in the `connected` frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Emit = 0x01,
    Ack = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    Connected = 0x05,
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// A named event with a payload, in either direction.
    #[serde(rename = "emit")]
    Emit {
        /// Request ID; when present the server answers with an `ack`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Command name (client to server) or address (server to client).
        event: String,
        /// Event payload.
        #[serde(default)]
        data: Value,
    },

    /// Reply to a command: `"ok"` or the error text.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged command.
        id: u64,
        /// Reply string.
        data: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent by the server once the connection is established.
    #[serde(rename = "connected")]
    Connected {
        /// Identity the server assigned to this connection.
        connection_id: String,
        /// Protocol version.
        version: u8,
        /// Heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Emit { .. } => FrameType::Emit,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Create a fire-and-forget emit frame.
    #[must_use]
    pub fn emit(event: impl Into<String>, data: Value) -> Self {
        Frame::Emit {
            id: None,
            event: event.into(),
            data,
        }
    }

    /// Create an emit frame that expects an `ack`.
    #[must_use]
    pub fn emit_with_ack(id: u64, event: impl Into<String>, data: Value) -> Self {
        Frame::Emit {
            id: Some(id),
            event: event.into(),
            data,
        }
    }

    /// Create an ack frame.
    #[must_use]
    pub fn ack(id: u64, reply: impl Into<String>) -> Self {
        Frame::Ack {
            id,
            data: reply.into(),
        }
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type() {
        assert_eq!(
            Frame::emit("subscribe", json!({})).frame_type(),
            FrameType::Emit
        );
        assert_eq!(Frame::ack(1, "ok").frame_type(), FrameType::Ack);
    }

    #[test]
    fn test_emit_json_shape() {
        let frame = Frame::emit_with_ack(7, "subscribe", json!({"channels": "a"}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "emit", "id": 7, "event": "subscribe", "data": {"channels": "a"}})
        );
    }

    #[test]
    fn test_emit_without_id_or_data() {
        let frame: Frame = serde_json::from_value(json!({"type": "emit", "event": "x"})).unwrap();
        assert_eq!(frame, Frame::emit("x", Value::Null));
    }
}
